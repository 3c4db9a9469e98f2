use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default number of turns a [`ResponseConfig`] keeps per conversation.
pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 5;

/// One keyword-set → response mapping of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeEntry {
    /// Words or phrases that must appear (as whole words) in the input.
    /// Blank strings are ignored at match time.
    pub keywords: Vec<String>,
    /// Text returned when this entry wins. Blank means "no response".
    pub response: String,
}

impl KnowledgeEntry {
    pub fn new<K, S>(keywords: K, response: impl Into<String>) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            response: response.into(),
        }
    }
}

/// Tunable parameters of the response engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Minimum match score (inclusive) an entry needs to be accepted.
    pub match_threshold: f32,
    /// Returned for empty input and when nothing qualifies.
    pub default_response: String,
    /// Display-time decoration, never part of matching.
    pub bot_prefix: String,
    pub bot_suffix: String,
    /// Turns kept per conversation before FIFO eviction.
    pub max_history_length: usize,
}

impl ResponseConfig {
    /// Check the invariants once, at construction time.
    pub fn validate(&self) -> Result<(), BotError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(BotError::InvalidConfig(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.default_response.trim().is_empty() {
            return Err(BotError::InvalidConfig(
                "default_response must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Wrap `text` in the configured prefix and suffix for display.
    pub fn decorate(&self, text: &str) -> String {
        format!("{}{}{}", self.bot_prefix, text, self.bot_suffix)
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            default_response: "Sorry, I didn't quite catch that. Ask me about the places I know."
                .to_string(),
            bot_prefix: String::new(),
            bot_suffix: String::new(),
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
        }
    }
}

/// A single (input, response) exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    user_message: String,
    bot_response: String,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, bot_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            bot_response: bot_response.into(),
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn bot_response(&self) -> &str {
        &self.bot_response
    }
}

/// A typed OSC argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OscArg {
    Str(String),
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl OscArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscArg::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// OSC type-tag character for this argument.
    pub fn type_tag(&self) -> char {
        match self {
            OscArg::Str(_) => 's',
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
        }
    }
}

impl From<&str> for OscArg {
    fn from(value: &str) -> Self {
        OscArg::Str(value.to_string())
    }
}

impl From<String> for OscArg {
    fn from(value: String) -> Self {
        OscArg::Str(value)
    }
}

impl From<i32> for OscArg {
    fn from(value: i32) -> Self {
        OscArg::Int(value)
    }
}

impl From<f32> for OscArg {
    fn from(value: f32) -> Self {
        OscArg::Float(value)
    }
}

impl From<bool> for OscArg {
    fn from(value: bool) -> Self {
        OscArg::Bool(value)
    }
}

/// Address-routed wire message, used for both directions of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    /// Hierarchical path, e.g. `/vrchat/chat`.
    pub address: String,
    pub args: Vec<OscArg>,
}

impl BridgeMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Lifecycle of one logical bridge connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Nothing bound yet.
    Uninitialized,
    /// Local listener bound, no traffic seen.
    Ready,
    /// Messages are flowing.
    Active,
    /// An expected reply did not arrive in time.
    Degraded,
    /// Ready, but every reply is fabricated locally.
    Simulated,
}

impl LinkState {
    /// `true` for [`LinkState::Ready`] and its simulated sub-state.
    pub fn is_ready(self) -> bool {
        matches!(self, LinkState::Ready | LinkState::Simulated)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkState::Uninitialized => "uninitialized",
            LinkState::Ready => "ready",
            LinkState::Active => "active",
            LinkState::Degraded => "degraded",
            LinkState::Simulated => "simulated",
        };
        f.write_str(label)
    }
}

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "worldbot-runtime::service"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// A finished bot reply, already decorated for display.
    BotMessage {
        sender_id: Option<i32>,
        text: String,
    },
    /// Someone used an item in the world.
    Interaction {
        item_id: String,
        item_name: String,
        sender_name: String,
        sender_id: i32,
    },
    LinkChanged(LinkState),
}

/// Point-in-time view of the running service, served by the status panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub listening_on: String,
    pub sending_to: String,
    pub link_state: LinkState,
    pub simulated: bool,
    pub notifications_enabled: bool,
    pub knowledge_entries: usize,
    pub knowledge_topics: Vec<String>,
    pub active_sessions: usize,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            listening_on: String::new(),
            sending_to: String::new(),
            link_state: LinkState::Uninitialized,
            simulated: false,
            notifications_enabled: false,
            knowledge_entries: 0,
            knowledge_topics: Vec::new(),
            active_sessions: 0,
        }
    }
}

/// Error type shared by every worldbot crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BotError {
    #[error("Configuration Missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Knowledge Base Load Failed: {0}")]
    KnowledgeLoad(String),

    #[error("Transport Unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Malformed Message on {address}: {reason}")]
    MalformedMessage { address: String, reason: String },

    #[error("OSC Codec Error: {0}")]
    Codec(String),

    #[error("Notification Failed: {0}")]
    Notification(String),
}

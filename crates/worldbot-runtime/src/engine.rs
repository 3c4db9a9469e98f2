//! [`KnowledgeEngine`] – turns one line of chat into one reply.
//!
//! The engine owns the knowledge store and the response configuration but no
//! conversation state: callers pass in the [`ConversationHistory`] of the
//! person they are answering.
//!
//! # Fail-closed
//!
//! An engine assembled without a store or a valid configuration still
//! answers, with [`NOT_CONFIGURED_RESPONSE`], and never touches history.

use std::sync::Arc;

use tracing::{debug, error, instrument};
use worldbot_knowledge::{ConversationHistory, KnowledgeStore, find_best_match, normalize};
use worldbot_types::{BotError, ConversationTurn, ResponseConfig};

use crate::small_talk;

/// Returned by every call on an engine that is missing its store or config.
pub const NOT_CONFIGURED_RESPONSE: &str =
    "The bot is not configured yet. Please tell the world owner.";

/// Name used in small-talk replies when the sender is unknown.
const ANONYMOUS_SENDER: &str = "there";

struct Configured {
    store: Arc<KnowledgeStore>,
    config: ResponseConfig,
}

pub struct KnowledgeEngine {
    inner: Option<Configured>,
    small_talk: bool,
}

impl KnowledgeEngine {
    /// Build a working engine.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidConfig`] when `config` fails validation.
    pub fn new(store: Arc<KnowledgeStore>, config: ResponseConfig) -> Result<Self, BotError> {
        config.validate()?;
        Ok(Self {
            inner: Some(Configured { store, config }),
            small_talk: false,
        })
    }

    /// Build from optional parts.
    ///
    /// Missing or invalid parts are logged and yield a fail-closed engine
    /// rather than an error.
    pub fn from_parts(store: Option<Arc<KnowledgeStore>>, config: Option<ResponseConfig>) -> Self {
        let (store, config) = match (store, config) {
            (Some(store), Some(config)) => (store, config),
            (store, config) => {
                let missing = match (store.is_none(), config.is_none()) {
                    (true, true) => "knowledge store and response config",
                    (true, false) => "knowledge store",
                    _ => "response config",
                };
                let e = BotError::ConfigurationMissing(missing.to_string());
                error!(error = %e, "knowledge engine disabled");
                return Self::unconfigured();
            }
        };
        match Self::new(store, config) {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "knowledge engine disabled");
                Self::unconfigured()
            }
        }
    }

    fn unconfigured() -> Self {
        Self {
            inner: None,
            small_talk: false,
        }
    }

    /// Enable greeting / help / thanks replies when nothing else matches.
    pub fn with_small_talk(mut self, enabled: bool) -> Self {
        self.small_talk = enabled;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub fn config(&self) -> Option<&ResponseConfig> {
        self.inner.as_ref().map(|c| &c.config)
    }

    pub fn store(&self) -> Option<&Arc<KnowledgeStore>> {
        self.inner.as_ref().map(|c| &c.store)
    }

    /// An empty history sized from the configuration.
    pub fn new_history(&self) -> ConversationHistory {
        match &self.inner {
            Some(c) => ConversationHistory::new(c.config.max_history_length),
            None => ConversationHistory::default(),
        }
    }

    /// Answer `input`, recording the turn in `history`.
    ///
    /// Blank input gets the default response and is not recorded.
    pub fn process_input(&self, history: &mut ConversationHistory, input: &str) -> String {
        self.respond(history, input, None)
    }

    /// Like [`process_input`][Self::process_input], naming the sender in
    /// small-talk replies.
    #[instrument(level = "debug", skip(self, history, input), fields(input_len = input.len()))]
    pub fn respond(
        &self,
        history: &mut ConversationHistory,
        input: &str,
        sender_name: Option<&str>,
    ) -> String {
        let Some(Configured { store, config }) = &self.inner else {
            return NOT_CONFIGURED_RESPONSE.to_string();
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return config.default_response.clone();
        }

        let response = match find_best_match(trimmed, store, config.match_threshold) {
            Some(outcome) => {
                debug!(entry = outcome.index, score = outcome.score, "knowledge match");
                outcome.response.to_string()
            }
            None => self
                .small_talk_reply(trimmed, sender_name, store)
                .unwrap_or_else(|| config.default_response.clone()),
        };

        history.append(ConversationTurn::new(trimmed, response.as_str()));
        response
    }

    fn small_talk_reply(
        &self,
        trimmed: &str,
        sender_name: Option<&str>,
        store: &KnowledgeStore,
    ) -> Option<String> {
        if !self.small_talk {
            return None;
        }
        let name = sender_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(ANONYMOUS_SENDER);
        small_talk::reply(&normalize(trimmed), name, store.topics())
    }

    /// Apply the configured prefix and suffix for display.
    pub fn decorate(&self, text: &str) -> String {
        match &self.inner {
            Some(c) => c.config.decorate(text),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldbot_types::KnowledgeEntry;

    fn engine(entries: Vec<KnowledgeEntry>) -> KnowledgeEngine {
        let store = Arc::new(KnowledgeStore::new(entries).unwrap());
        KnowledgeEngine::new(store, ResponseConfig::default()).unwrap()
    }

    fn coffee_engine() -> KnowledgeEngine {
        engine(vec![
            KnowledgeEntry::new(["coffee", "espresso"], "Coffee is on the second floor."),
            KnowledgeEntry::new(["pool"], "The pool is outside."),
        ])
    }

    #[test]
    fn threshold_boundary_match_is_returned_and_recorded() {
        let engine = coffee_engine();
        let mut history = engine.new_history();
        let reply = engine.process_input(&mut history, "I'd like coffee");
        assert_eq!(reply, "Coffee is on the second floor.");
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().user_message(), "I'd like coffee");
    }

    #[test]
    fn blank_input_returns_default_without_history() {
        let engine = coffee_engine();
        let mut history = engine.new_history();
        let default = ResponseConfig::default().default_response;
        assert_eq!(engine.process_input(&mut history, ""), default);
        assert_eq!(engine.process_input(&mut history, "   "), default);
        assert!(history.is_empty());
    }

    #[test]
    fn no_match_falls_back_to_default_and_is_recorded() {
        let engine = coffee_engine();
        let mut history = engine.new_history();
        let reply = engine.process_input(&mut history, "?!");
        assert_eq!(reply, ResponseConfig::default().default_response);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn input_is_trimmed_before_recording() {
        let engine = coffee_engine();
        let mut history = engine.new_history();
        engine.process_input(&mut history, "  where is the pool  ");
        assert_eq!(history.last().unwrap().user_message(), "where is the pool");
    }

    #[test]
    fn history_keeps_the_latest_turns() {
        let engine = coffee_engine();
        let mut history = engine.new_history();
        let k = 3;
        for i in 0..(5 + k) {
            engine.process_input(&mut history, &format!("message {i}"));
        }
        assert_eq!(history.len(), 5);
        assert_eq!(
            history.turns().next().unwrap().user_message(),
            format!("message {k}")
        );
    }

    #[test]
    fn missing_parts_fail_closed() {
        let store = Arc::new(KnowledgeStore::new(vec![]).unwrap());
        for engine in [
            KnowledgeEngine::from_parts(None, Some(ResponseConfig::default())),
            KnowledgeEngine::from_parts(Some(store), None),
            KnowledgeEngine::from_parts(None, None),
        ] {
            assert!(!engine.is_configured());
            let mut history = engine.new_history();
            assert_eq!(engine.process_input(&mut history, "coffee"), NOT_CONFIGURED_RESPONSE);
            assert!(history.is_empty());
        }
    }

    #[test]
    fn invalid_config_fails_closed_through_from_parts() {
        let store = Arc::new(KnowledgeStore::new(vec![]).unwrap());
        let mut config = ResponseConfig::default();
        config.match_threshold = 2.0;
        assert!(KnowledgeEngine::new(Arc::clone(&store), config.clone()).is_err());
        assert!(!KnowledgeEngine::from_parts(Some(store), Some(config)).is_configured());
    }

    #[test]
    fn small_talk_only_when_enabled_and_unmatched() {
        let plain = coffee_engine();
        let mut history = plain.new_history();
        assert_eq!(
            plain.respond(&mut history, "hello", Some("Alice")),
            ResponseConfig::default().default_response
        );

        let chatty = coffee_engine().with_small_talk(true);
        let reply = chatty.respond(&mut history, "hello", Some("Alice"));
        assert!(reply.starts_with("Hello Alice!"));

        let reply = chatty.respond(&mut history, "hello, any coffee?", Some("Alice"));
        assert_eq!(reply, "Coffee is on the second floor.");

        let reply = chatty.process_input(&mut history, "hi");
        assert!(reply.starts_with("Hello there!"));
    }

    #[test]
    fn decorate_uses_prefix_and_suffix() {
        let store = Arc::new(KnowledgeStore::new(vec![]).unwrap());
        let mut config = ResponseConfig::default();
        config.bot_prefix = "[Bot] ".into();
        config.bot_suffix = " ~".into();
        let engine = KnowledgeEngine::new(store, config).unwrap();
        assert_eq!(engine.decorate("hi"), "[Bot] hi ~");
        assert_eq!(KnowledgeEngine::from_parts(None, None).decorate("hi"), "hi");
    }
}

//! Knowledge Store.
//!
//! Holds the ordered list of [`KnowledgeEntry`] values the matcher scans.  The
//! store is built once and never mutated afterwards, so it can be shared
//! behind an `Arc` by any number of readers without locking.
//!
//! # File format
//!
//! A knowledge file (JSON or TOML, chosen by extension) comes in one of two
//! forms.  The sectioned form has two optional sections:
//!
//! | key       | shape                                                     |
//! |-----------|-----------------------------------------------------------|
//! | `entries` | `[{ "keywords": [..], "response": ".." }]`                |
//! | `topics`  | `[{ "name", "aliases", "description", "details", "website", "contact" }]` |
//!
//! Any other top-level key is an error.  The name-keyed form maps each topic
//! name to its fields, in file order:
//!
//! ```json
//! { "Moon Cafe": { "aliases": ["coffee"], "description": "A cozy cafe." } }
//! ```
//!
//! An empty document loads as an empty store.
//!
//! Plain entries come first in scan order, followed by the entries generated
//! from topics.  Every trigger of a topic (its name and each alias) becomes a
//! single-keyword entry that answers with the topic's composed description.
//!
//! # Example
//!
//! ```rust
//! use worldbot_knowledge::store::KnowledgeStore;
//!
//! let store = KnowledgeStore::from_json_str(r#"{
//!     "entries": [{ "keywords": ["coffee"], "response": "Coffee is upstairs." }]
//! }"#).unwrap();
//! assert_eq!(store.len(), 1);
//! ```

use std::fs;
use std::path::Path;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use worldbot_types::{BotError, KnowledgeEntry};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while loading a knowledge file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON knowledge file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML knowledge file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("keyword {keyword:?} cannot be compiled: {source}")]
    Pattern {
        keyword: String,
        #[source]
        source: regex::Error,
    },
    #[error("knowledge file must be a table at the top level")]
    NotATable,
    #[error("unknown knowledge file section {0:?} (expected `entries` or `topics`)")]
    UnknownSection(String),
    #[error("topic {name:?} is not a table of fields: {source}")]
    Topic {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported knowledge file extension: {0:?}")]
    UnsupportedFormat(String),
}

impl From<LoadError> for BotError {
    fn from(err: LoadError) -> Self {
        BotError::KnowledgeLoad(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File model
// ─────────────────────────────────────────────────────────────────────────────

/// A business, place or subject described in prose rather than as a raw
/// keyword entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicRecord {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl TopicRecord {
    /// The text the bot answers with when any trigger of this topic matches.
    pub fn compose_response(&self) -> String {
        let description = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("No description available.");
        let mut response = format!("Regarding {}:\n{}", self.name, description);
        let extras = [
            ("More Info", &self.details),
            ("Website", &self.website),
            ("Contact", &self.contact),
        ];
        for (label, value) in extras {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                response.push_str(&format!("\n{label}: {v}"));
            }
        }
        response
    }

    fn triggers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Fields of a topic in the name-keyed form; the key supplies the name.
#[derive(Debug, Default, Deserialize)]
struct TopicFields {
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    contact: Option<String>,
}

impl TopicFields {
    fn named(self, name: String) -> TopicRecord {
        TopicRecord {
            name,
            aliases: self.aliases,
            description: self.description,
            details: self.details,
            website: self.website,
            contact: self.contact,
        }
    }
}

const SECTIONS: [&str; 2] = ["entries", "topics"];

/// On-disk shape of a knowledge file (sectioned form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct KnowledgeFile {
    #[serde(default)]
    pub entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub topics: Vec<TopicRecord>,
}

impl KnowledgeFile {
    /// Interpret a parsed document in either the sectioned or the name-keyed
    /// form.
    pub fn from_value(value: Value) -> Result<Self, LoadError> {
        let Value::Object(map) = value else {
            return Err(LoadError::NotATable);
        };
        if map.keys().any(|k| SECTIONS.contains(&k.as_str())) {
            if let Some(other) = map.keys().find(|k| !SECTIONS.contains(&k.as_str())) {
                return Err(LoadError::UnknownSection(other.clone()));
            }
            return Ok(serde_json::from_value(Value::Object(map))?);
        }

        let mut topics = Vec::with_capacity(map.len());
        for (name, fields) in map {
            let fields: TopicFields = serde_json::from_value(fields).map_err(|source| {
                LoadError::Topic {
                    name: name.clone(),
                    source,
                }
            })?;
            topics.push(fields.named(name));
        }
        Ok(Self {
            entries: Vec::new(),
            topics,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiled entries
// ─────────────────────────────────────────────────────────────────────────────

/// Build the whole-word matcher for one keyword.
///
/// Returns `Ok(None)` for blank keywords.  The keyword is trimmed, lower-cased
/// and escaped, then anchored on both sides by the start/end of the input or a
/// non-word character, so `"cat"` never matches inside `"category"` and
/// keywords such as `"c++"` are treated literally.
pub(crate) fn compile_keyword(keyword: &str) -> Result<Option<Regex>, regex::Error> {
    let normalized = keyword.trim().to_lowercase();
    if normalized.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?:^|\W){}(?:\W|$)", regex::escape(&normalized));
    Regex::new(&pattern).map(Some)
}

/// A [`KnowledgeEntry`] together with its precompiled keyword matchers.
#[derive(Debug, Clone)]
pub struct CompiledEntry {
    entry: KnowledgeEntry,
    matchers: Vec<Regex>,
}

impl CompiledEntry {
    fn compile(entry: KnowledgeEntry) -> Result<Self, LoadError> {
        let mut matchers = Vec::with_capacity(entry.keywords.len());
        for keyword in &entry.keywords {
            match compile_keyword(keyword) {
                Ok(Some(re)) => matchers.push(re),
                Ok(None) => {}
                Err(source) => {
                    return Err(LoadError::Pattern {
                        keyword: keyword.clone(),
                        source,
                    });
                }
            }
        }
        Ok(Self { entry, matchers })
    }

    pub fn entry(&self) -> &KnowledgeEntry {
        &self.entry
    }

    pub fn response(&self) -> &str {
        &self.entry.response
    }

    /// Number of non-blank keywords.
    pub fn valid_keywords(&self) -> usize {
        self.matchers.len()
    }

    /// Fraction of valid keywords found in `normalized` input.
    ///
    /// `None` when the entry has no valid keyword and therefore never matches.
    pub fn score(&self, normalized: &str) -> Option<f32> {
        if self.matchers.is_empty() {
            return None;
        }
        let found = self.matchers.iter().filter(|re| re.is_match(normalized)).count();
        Some(found as f32 / self.matchers.len() as f32)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, ordered knowledge base.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    entries: Vec<CompiledEntry>,
    topics: Vec<String>,
}

impl KnowledgeStore {
    /// Build a store from raw entries, compiling every keyword once.
    pub fn new(entries: Vec<KnowledgeEntry>) -> Result<Self, LoadError> {
        Self::from_file_model(KnowledgeFile {
            entries,
            topics: Vec::new(),
        })
    }

    /// Build a store from a parsed [`KnowledgeFile`].
    pub fn from_file_model(file: KnowledgeFile) -> Result<Self, LoadError> {
        let mut entries = Vec::with_capacity(file.entries.len());
        for entry in file.entries {
            entries.push(CompiledEntry::compile(entry)?);
        }

        let mut topics = Vec::with_capacity(file.topics.len());
        for topic in &file.topics {
            let response = topic.compose_response();
            for trigger in topic.triggers() {
                entries.push(CompiledEntry::compile(KnowledgeEntry::new(
                    [trigger],
                    response.clone(),
                ))?);
            }
            topics.push(topic.name.clone());
        }

        debug!(entries = entries.len(), topics = topics.len(), "knowledge store compiled");
        Ok(Self { entries, topics })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LoadError> {
        Self::from_file_model(KnowledgeFile::from_value(serde_json::from_str(raw)?)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, LoadError> {
        Self::from_file_model(KnowledgeFile::from_value(toml::from_str(raw)?)?)
    }

    /// Load a `.json` or `.toml` knowledge file from disk.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let store = match ext.as_str() {
            "json" => Self::from_json_str(&raw)?,
            "toml" => Self::from_toml_str(&raw)?,
            other => return Err(LoadError::UnsupportedFormat(other.to_string())),
        };
        info!(
            path = %path.display(),
            entries = store.len(),
            topics = store.topics.len(),
            "knowledge base loaded"
        );
        Ok(store)
    }

    /// Compiled entries in scan order.
    pub fn compiled(&self) -> &[CompiledEntry] {
        &self.entries
    }

    /// Raw entries in scan order.
    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.entries.iter().map(CompiledEntry::entry)
    }

    /// Names of the topics loaded from the `topics` section.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! `worldbot-knowledge` – The Knowledge Base.
//!
//! Everything the bot "knows" and how it decides what to say, without any
//! networking.
//!
//! # Modules
//!
//! - [`store`] – [`KnowledgeStore`][store::KnowledgeStore]: the immutable,
//!   ordered list of keyword-set → response entries, loaded once from a JSON or
//!   TOML file with every keyword pattern compiled up front.
//! - [`matcher`] – whole-word keyword scoring and best-entry selection with a
//!   threshold and first-wins tie-breaking.
//! - [`history`] – [`ConversationHistory`][history::ConversationHistory]: a
//!   bounded FIFO log of conversation turns.

pub mod history;
pub mod matcher;
pub mod store;

pub use history::ConversationHistory;
pub use matcher::{MatchOutcome, find_best_match, find_best_response, normalize, score};
pub use store::{KnowledgeFile, KnowledgeStore, LoadError, TopicRecord};

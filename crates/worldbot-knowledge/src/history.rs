//! [`ConversationHistory`] – bounded, ordered log of conversation turns.
//!
//! Appending beyond `max_len` evicts exactly one turn, the oldest.  A turn is
//! the atomic unit: a user message and the bot's answer leave together.
//!
//! # Example
//!
//! ```rust
//! use worldbot_knowledge::history::ConversationHistory;
//! use worldbot_types::ConversationTurn;
//!
//! let mut history = ConversationHistory::new(2);
//! history.append(ConversationTurn::new("hi", "hello"));
//! history.append(ConversationTurn::new("coffee?", "upstairs"));
//! history.append(ConversationTurn::new("thanks", "any time"));
//!
//! assert_eq!(history.len(), 2);
//! assert_eq!(history.turns().next().unwrap().user_message(), "coffee?");
//! ```

use std::collections::VecDeque;

use worldbot_types::{ConversationTurn, DEFAULT_MAX_HISTORY_LENGTH};

/// FIFO-bounded conversation log.  Never persisted.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_len: usize,
    turns: VecDeque<ConversationTurn>,
}

impl ConversationHistory {
    /// Create an empty history holding at most `max_len` turns.
    ///
    /// A `max_len` of zero keeps nothing.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            turns: VecDeque::with_capacity(max_len),
        }
    }

    /// Record a turn, evicting the oldest one if the bound is exceeded.
    pub fn append(&mut self, turn: ConversationTurn) {
        if self.max_len == 0 {
            return;
        }
        self.turns.push_back(turn);
        if self.turns.len() > self.max_len {
            self.turns.pop_front();
        }
    }

    /// Turns from oldest to newest.
    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Owned copy of the turns, oldest first.
    pub fn as_ordered_sequence(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Render the history for debug/log output, one `User:`/`Bot:` pair per
    /// turn, oldest first.
    pub fn as_formatted_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("User: {}\nBot: {}", t.user_message(), t.bot_response()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_LENGTH)
    }
}

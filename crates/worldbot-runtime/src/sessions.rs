//! Per-sender conversation histories.
//!
//! Every sender id gets its own [`ConversationHistory`].  The registry is
//! bounded: when full, the sender who spoke least recently is forgotten.

use std::collections::HashMap;

use worldbot_knowledge::ConversationHistory;

/// Senders tracked at once before the least recently active is dropped.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// Sender id used for lines typed at the local console.
pub const LOCAL_SENDER_ID: i32 = -1;

struct Session {
    history: ConversationHistory,
    last_active: u64,
}

pub struct SessionRegistry {
    max_history: usize,
    max_sessions: usize,
    tick: u64,
    sessions: HashMap<i32, Session>,
}

impl SessionRegistry {
    pub fn new(max_history: usize, max_sessions: usize) -> Self {
        Self {
            max_history,
            max_sessions: max_sessions.max(1),
            tick: 0,
            sessions: HashMap::new(),
        }
    }

    /// The history for `sender_id`, created on first use.
    pub fn history_mut(&mut self, sender_id: i32) -> &mut ConversationHistory {
        self.tick += 1;
        if !self.sessions.contains_key(&sender_id) && self.sessions.len() >= self.max_sessions {
            self.evict_idlest();
        }
        let max_history = self.max_history;
        let tick = self.tick;
        let session = self.sessions.entry(sender_id).or_insert_with(|| Session {
            history: ConversationHistory::new(max_history),
            last_active: tick,
        });
        session.last_active = tick;
        &mut session.history
    }

    pub fn history(&self, sender_id: i32) -> Option<&ConversationHistory> {
        self.sessions.get(&sender_id).map(|s| &s.history)
    }

    /// `User:` / `Bot:` transcript for `sender_id`; empty if unknown.
    pub fn history_text(&self, sender_id: i32) -> String {
        self.history(sender_id)
            .map(ConversationHistory::as_formatted_text)
            .unwrap_or_default()
    }

    pub fn remove(&mut self, sender_id: i32) -> Option<ConversationHistory> {
        self.sessions.remove(&sender_id).map(|s| s.history)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_idlest(&mut self) {
        if let Some(id) = self
            .sessions
            .iter()
            .min_by_key(|(_, s)| s.last_active)
            .map(|(id, _)| *id)
        {
            self.sessions.remove(&id);
        }
    }
}

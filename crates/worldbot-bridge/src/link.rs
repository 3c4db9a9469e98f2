//! [`LinkMonitor`] – connection state machine and reply watchdog.
//!
//! UDP gives no delivery feedback, so the only failure signal is silence:
//! every chat request sent to the remote registers a reply deadline, and
//! [`LinkMonitor::poll`] reports [`LinkState::Degraded`] once any deadline
//! passes without a reply.
//!
//! ```text
//! Uninitialized ──bind──▶ Ready ──traffic──▶ Active
//!                                   ▲            │
//!                                   │  timeout   ▼
//!                                   └─inbound── Degraded
//! ```
//!
//! [`LinkState::Simulated`] is terminal: the simulated transport always
//! answers, so nothing is tracked.
//!
//! All methods return `Some(new_state)` only when the state changed.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use worldbot_types::LinkState;

/// Outstanding reply deadlines kept at once.  Older ones are forgotten.
const MAX_PENDING_REPLIES: usize = 64;

pub struct LinkMonitor {
    state: LinkState,
    reply_timeout: Duration,
    pending: VecDeque<Instant>,
}

impl LinkMonitor {
    pub fn new(reply_timeout: Duration) -> Self {
        Self {
            state: LinkState::Uninitialized,
            reply_timeout,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Number of replies still awaited.
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    /// The transport is up; `initial` is [`LinkState::Ready`] or
    /// [`LinkState::Simulated`].
    pub fn on_bound(&mut self, initial: LinkState) -> Option<LinkState> {
        self.pending.clear();
        self.transition(initial)
    }

    /// A message left through the transport.  `expects_reply` registers a
    /// deadline of `now + reply_timeout`.
    pub fn on_outbound(&mut self, now: Instant, expects_reply: bool) -> Option<LinkState> {
        if self.state == LinkState::Simulated || self.state == LinkState::Uninitialized {
            return None;
        }
        if expects_reply {
            if self.pending.len() == MAX_PENDING_REPLIES {
                self.pending.pop_front();
            }
            self.pending.push_back(now + self.reply_timeout);
        }
        match self.state {
            LinkState::Ready => self.transition(LinkState::Active),
            _ => None,
        }
    }

    /// A message arrived.  `is_reply` settles the oldest outstanding
    /// deadline.  Any inbound traffic proves the remote is alive.
    pub fn on_inbound(&mut self, _now: Instant, is_reply: bool) -> Option<LinkState> {
        if self.state == LinkState::Simulated || self.state == LinkState::Uninitialized {
            return None;
        }
        if is_reply {
            self.pending.pop_front();
        }
        self.transition(LinkState::Active)
    }

    /// Check reply deadlines.  Expired deadlines are dropped.
    pub fn poll(&mut self, now: Instant) -> Option<LinkState> {
        if self.state == LinkState::Simulated {
            return None;
        }
        let before = self.pending.len();
        self.pending.retain(|deadline| *deadline > now);
        if self.pending.len() < before {
            return self.transition(LinkState::Degraded);
        }
        None
    }

    fn transition(&mut self, next: LinkState) -> Option<LinkState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

//! Offline transport.
//!
//! [`SimulatedTransport`] performs no network I/O.  Every outbound chat
//! request ([`ADDR_CHAT`]) is answered with [`SIMULATED_REPLY_TEXT`] after
//! [`SIMULATED_REPLY_DELAY`], whatever the request said.  Replies are pushed
//! onto the inbound queue by a worker task, so the caller never waits and
//! replies arrive in the order the requests were sent.
//!
//! Everything sent is also kept in a short log for inspection.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use worldbot_types::{BotError, BridgeMessage, LinkState};

use crate::adapter::BridgeAdapter;
use crate::protocol::{ADDR_CHAT, encode_bot_response};
use crate::udp::ListenerHandle;

/// Delay before a simulated reply is delivered.
pub const SIMULATED_REPLY_DELAY: Duration = Duration::from_secs(1);

/// The canned reply to every simulated chat request.
pub const SIMULATED_REPLY_TEXT: &str = "This is a simulated response from the bot.";

const SENT_LOG_CAPACITY: usize = 256;

struct Scheduled {
    due: Instant,
    message: BridgeMessage,
}

/// Transport that fabricates replies locally.
pub struct SimulatedTransport {
    delay: Duration,
    schedule: mpsc::UnboundedSender<Scheduled>,
    sent: Mutex<VecDeque<BridgeMessage>>,
}

impl SimulatedTransport {
    /// Start the reply worker with the standard one-second delay.
    pub fn spawn(inbound: mpsc::Sender<BridgeMessage>) -> (Self, ListenerHandle) {
        Self::with_delay(inbound, SIMULATED_REPLY_DELAY)
    }

    /// Start the reply worker with a custom delay.
    pub fn with_delay(
        inbound: mpsc::Sender<BridgeMessage>,
        delay: Duration,
    ) -> (Self, ListenerHandle) {
        let (schedule, schedule_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(deliver(schedule_rx, inbound, stop_rx));
        info!(delay_ms = delay.as_millis() as u64, "simulated bridge started");
        (
            Self {
                delay,
                schedule,
                sent: Mutex::new(VecDeque::new()),
            },
            ListenerHandle::new(stop, task),
        )
    }

    /// Messages sent so far, oldest first.  Only the most recent
    /// few hundred are kept.
    pub fn sent(&self) -> Vec<BridgeMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, message: BridgeMessage) {
        let mut log = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if log.len() == SENT_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(message);
    }
}

async fn deliver(
    mut schedule: mpsc::UnboundedReceiver<Scheduled>,
    inbound: mpsc::Sender<BridgeMessage>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            next = schedule.recv() => next,
        };
        let Some(Scheduled { due, message }) = next else {
            break;
        };
        tokio::time::sleep_until(due).await;
        if inbound.send(message).await.is_err() {
            info!("inbound queue closed; simulated bridge exiting");
            return;
        }
    }
    info!("simulated bridge stopped");
}

#[async_trait]
impl BridgeAdapter for SimulatedTransport {
    async fn send(&self, message: BridgeMessage) -> Result<(), BotError> {
        debug!(address = %message.address, "simulated send");
        if message.address == ADDR_CHAT {
            let reply = Scheduled {
                due: Instant::now() + self.delay,
                message: encode_bot_response(SIMULATED_REPLY_TEXT),
            };
            if self.schedule.send(reply).is_err() {
                warn!("simulated reply worker is gone; reply dropped");
            }
        }
        self.record(message);
        Ok(())
    }

    fn initial_state(&self) -> LinkState {
        LinkState::Simulated
    }

    fn listening_on(&self) -> String {
        "simulation".to_string()
    }

    fn sending_to(&self) -> String {
        "simulation".to_string()
    }
}

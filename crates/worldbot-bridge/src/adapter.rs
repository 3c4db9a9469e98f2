//! The transport seam.
//!
//! The service never talks to a socket directly.  It hands outbound
//! [`BridgeMessage`] values to a [`BridgeAdapter`]; inbound traffic arrives on
//! the `mpsc` queue the adapter was constructed with.
//!
//! - [`UdpTransport`][crate::udp::UdpTransport] – OSC over UDP.
//! - [`SimulatedTransport`][crate::sim::SimulatedTransport] – offline, with
//!   canned replies.

use async_trait::async_trait;
use worldbot_types::{BotError, BridgeMessage, LinkState};

/// Every transport must implement this trait.
///
/// # Contract
///
/// * `send` is fire-and-forget: `Ok(())` means the message left this process,
///   not that anyone received it.  No retries.
/// * Inbound messages are pushed, decoded, onto the queue supplied when the
///   transport was built.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// Send one message, at most once.
    async fn send(&self, message: BridgeMessage) -> Result<(), BotError>;

    /// State the link starts in once the transport exists.
    fn initial_state(&self) -> LinkState;

    /// Human-readable local endpoint, for status output.
    fn listening_on(&self) -> String;

    /// Human-readable remote endpoint, for status output.
    fn sending_to(&self) -> String;
}

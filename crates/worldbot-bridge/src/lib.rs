//! `worldbot-bridge` – The Wire.
//!
//! Moves chat text between the bot and the outside world without caring what
//! the text means.
//!
//! # Modules
//!
//! - [`osc`] – OSC 1.0 packet encoder/decoder (messages and bundles).
//! - [`protocol`] – the address schema: chat requests, interaction notices and
//!   bot responses, plus message clamping.
//! - [`adapter`] – [`BridgeAdapter`], the trait every transport implements.
//! - [`udp`] – [`UdpTransport`]: real OSC-over-UDP with a background listener
//!   task feeding an inbound queue.
//! - [`sim`] – [`SimulatedTransport`]: no network at all; chat requests are
//!   answered with a fixed text after a fixed delay.
//! - [`link`] – [`LinkMonitor`]: the per-connection state machine and reply
//!   watchdog.
//! - [`bus`] – topic-based broadcast bus fanning events out to display and
//!   observability consumers.

pub mod adapter;
pub mod bus;
pub mod link;
pub mod osc;
pub mod protocol;
pub mod sim;
pub mod udp;

pub use adapter::BridgeAdapter;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use link::LinkMonitor;
pub use protocol::{ChatRequest, Inbound, InteractionNotice};
pub use sim::SimulatedTransport;
pub use udp::{ListenerHandle, UdpConfig, UdpTransport};

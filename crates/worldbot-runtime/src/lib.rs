//! `worldbot-runtime` – The Brain and its nervous system.
//!
//! Wires the knowledge base to the bridge and runs the whole thing.
//!
//! # Modules
//!
//! - [`engine`] – [`KnowledgeEngine`][engine::KnowledgeEngine]: turns one chat
//!   line into one reply using the knowledge store, an optional small-talk
//!   fallback and a caller-supplied conversation history.  Fails closed with a
//!   fixed message when it was built without a store or config.
//! - [`sessions`] – [`SessionRegistry`][sessions::SessionRegistry]: one
//!   bounded history per sender id.
//! - [`service`] – [`BridgeService`][service::BridgeService]: the single task
//!   that drains the inbound queue, answers chat, forwards interactions,
//!   tracks the link state and feeds every display.
//! - [`notifier`] – [`InteractionNotifier`][notifier::InteractionNotifier]:
//!   Discord webhook alerts when someone uses an item.
//! - [`small_talk`] – greetings, help and thanks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export.

pub mod engine;
pub mod notifier;
pub mod service;
pub mod sessions;
pub mod small_talk;
pub mod telemetry;

pub use engine::{KnowledgeEngine, NOT_CONFIGURED_RESPONSE};
pub use notifier::InteractionNotifier;
pub use service::{BridgeService, DisplaySink, ServiceConfig, ServiceHandle};
pub use sessions::{LOCAL_SENDER_ID, SessionRegistry};
pub use telemetry::{TracerProviderGuard, init_tracing};

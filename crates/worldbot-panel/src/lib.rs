//! `worldbot-panel` – The Status Panel.
//!
//! A small HTTP + WebSocket server (default port `5000`) that:
//!
//! 1. **Reports** the live [`StatusSnapshot`][worldbot_types::StatusSnapshot]
//!    at `GET /status`: addresses, link state, simulation and notifier flags,
//!    loaded topics.
//! 2. **Serves** a single-page view of that status at `GET /`.
//! 3. **Streams** bot messages, item interactions and link changes from the
//!    [`EventBus`][worldbot_bridge::EventBus] to every connected WebSocket
//!    client.
//!
//! ```rust,no_run
//! use std::sync::{Arc, RwLock};
//! use worldbot_bridge::EventBus;
//! use worldbot_panel::PanelServer;
//! use worldbot_types::StatusSnapshot;
//!
//! #[tokio::main]
//! async fn main() {
//!     let status = Arc::new(RwLock::new(StatusSnapshot::default()));
//!     PanelServer::new(EventBus::default(), status)
//!         .run()
//!         .await
//!         .expect("panel failed");
//! }
//! ```

pub mod server;

pub use server::{DEFAULT_HOST, DEFAULT_PORT, PanelServer};

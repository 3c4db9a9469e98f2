//! [`PanelServer`] – HTTP + WebSocket status panel.
//!
//! * `GET /status` → the current [`StatusSnapshot`] as JSON.
//! * `GET /` → the embedded status page.
//! * WebSocket upgrade (any path) → every conversation, interaction and link
//!   event from the [`EventBus`], serialized as JSON text frames.
//!
//! Anything else gets a 404.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use worldbot_bridge::{EventBus, Topic, TopicReceiver};
use worldbot_types::{BotError, Event, StatusSnapshot};

/// Default TCP port for the panel.
pub const DEFAULT_PORT: u16 = 5000;

/// Loopback only unless the operator opts into a wider interface.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const PANEL_HTML: &str = include_str!("panel.html");

pub struct PanelServer {
    bus: EventBus,
    status: Arc<RwLock<StatusSnapshot>>,
    host: IpAddr,
    port: u16,
}

impl PanelServer {
    pub fn new(bus: EventBus, status: Arc<RwLock<StatusSnapshot>>) -> Self {
        Self {
            bus,
            status,
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Bind on the configured host and port.
    ///
    /// # Errors
    ///
    /// [`BotError::TransportUnavailable`] if the port is taken.
    pub async fn bind(&self) -> Result<TcpListener, BotError> {
        let addr = self.addr();
        TcpListener::bind(addr)
            .await
            .map_err(|e| BotError::TransportUnavailable(format!("panel bind error on {addr}: {e}")))
    }

    /// Bind and serve forever.
    pub async fn run(self) -> Result<(), BotError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(url = %format!("http://{addr}"), "status panel listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bus = self.bus.clone();
                    let status = Arc::clone(&self.status);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, bus, status).await {
                            debug!(peer = %peer, error = %e, "panel client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "panel accept error"),
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    bus: EventBus,
    status: Arc<RwLock<StatusSnapshot>>,
) -> Result<(), BotError> {
    // Peek so the WebSocket handshake still sees the whole request.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| BotError::TransportUnavailable(format!("peek error from {peer}: {e}")))?;
    let head = String::from_utf8_lossy(&buf[..n]).into_owned();

    if is_websocket_upgrade(&head) {
        return handle_ws(stream, peer, bus).await;
    }

    // Consume what was peeked before answering.
    let _ = stream.read(&mut buf).await;
    let response = match request_path(&head) {
        Some("/status") => {
            let snapshot = status
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            let body = serde_json::to_string(&snapshot)
                .map_err(|e| BotError::Codec(format!("status serialization: {e}")))?;
            http_response("200 OK", "application/json", &body)
        }
        Some("/") | Some("/index.html") => {
            http_response("200 OK", "text/html; charset=utf-8", PANEL_HTML)
        }
        _ => http_response("404 Not Found", "text/plain; charset=utf-8", "not found"),
    };
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| BotError::TransportUnavailable(format!("HTTP write error: {e}")))?;
    let _ = stream.shutdown().await;
    Ok(())
}

fn is_websocket_upgrade(head: &str) -> bool {
    head.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    })
}

/// Path of a `GET` request line, without any query string.
fn request_path(head: &str) -> Option<&str> {
    let mut parts = head.lines().next()?.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    Some(target.split('?').next().unwrap_or(target))
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

async fn handle_ws(stream: TcpStream, peer: SocketAddr, bus: EventBus) -> Result<(), BotError> {
    let ws_stream = accept_async(stream).await.map_err(|e| {
        BotError::TransportUnavailable(format!("WS handshake from {peer}: {e}"))
    })?;
    info!(peer = %peer, "panel websocket client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut conversation = bus.subscribe_to(Topic::Conversation);
    let mut interactions = bus.subscribe_to(Topic::Interactions);
    let mut link = bus.subscribe_to(Topic::Link);

    loop {
        let event = tokio::select! {
            event = next_event(&mut conversation, peer) => event,
            event = next_event(&mut interactions, peer) => event,
            event = next_event(&mut link, peer) => event,
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Upstream frames are not interpreted.
                    _ => continue,
                }
            }
        };
        let Some(event) = event else {
            break;
        };
        match serde_json::to_string(&event) {
            Ok(json) => {
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "event serialization error"),
        }
    }
    debug!(peer = %peer, "panel websocket client gone");
    Ok(())
}

/// Next event on `rx`, skipping over lag.  `None` once the bus is closed.
async fn next_event(rx: &mut TopicReceiver, peer: SocketAddr) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(n)) => {
                warn!(peer = %peer, topic = ?rx.topic(), skipped = n, "panel client lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

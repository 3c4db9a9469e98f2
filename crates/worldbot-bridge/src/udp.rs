//! OSC-over-UDP transport.
//!
//! [`UdpTransport::bind`] binds one socket on the listen address and spawns a
//! listener task that:
//!
//! 1. **Receives** datagrams and decodes them with [`osc::decode`].
//! 2. **Queues** every decoded message on the inbound `mpsc` channel, in
//!    arrival order.
//! 3. **Drops** undecodable datagrams with a `warn!` and keeps going.
//!
//! Outbound messages leave through the same socket towards the configured
//! remote.  Sends above the configured rate are dropped.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use worldbot_types::{BotError, BridgeMessage, LinkState};

use crate::adapter::BridgeAdapter;
use crate::osc;

/// Largest datagram the listener accepts.
pub const MAX_DATAGRAM_BYTES: usize = 8 * 1024;

/// Addresses and limits for a [`UdpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpConfig {
    pub listen: SocketAddr,
    pub remote: SocketAddr,
    /// `None` disables outbound rate limiting.
    pub max_sends_per_second: Option<NonZeroU32>,
}

/// Real network transport.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    remote: SocketAddr,
    limiter: Option<DefaultDirectRateLimiter>,
}

/// Owns a transport's background task.  Call [`ListenerHandle::shutdown`] on teardown.
pub struct ListenerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub(crate) fn new(stop: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { stop, task }
    }

    /// Stop accepting datagrams and wait for the in-flight one to be queued.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "udp listener task ended abnormally");
        }
    }
}

impl UdpTransport {
    /// Bind the local socket and start the listener task.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::TransportUnavailable`] if the socket cannot be
    /// bound.
    pub async fn bind(
        config: UdpConfig,
        inbound: mpsc::Sender<BridgeMessage>,
    ) -> Result<(Self, ListenerHandle), BotError> {
        let socket = UdpSocket::bind(config.listen).await.map_err(|e| {
            BotError::TransportUnavailable(format!("udp bind error on {}: {e}", config.listen))
        })?;
        let local = socket.local_addr().map_err(|e| {
            BotError::TransportUnavailable(format!("udp local address unavailable: {e}"))
        })?;
        let socket = Arc::new(socket);

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(listen(Arc::clone(&socket), inbound, stop_rx));
        info!(listen = %local, remote = %config.remote, "udp bridge bound");

        let limiter = config
            .max_sends_per_second
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Ok((
            Self {
                socket,
                local,
                remote: config.remote,
                limiter,
            },
            ListenerHandle { stop, task },
        ))
    }

    /// The address the socket actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    inbound: mpsc::Sender<BridgeMessage>,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((n, peer)) => match osc::decode(&buf[..n]) {
                        Ok(messages) => {
                            for message in messages {
                                debug!(peer = %peer, address = %message.address, "datagram received");
                                if inbound.send(message).await.is_err() {
                                    info!("inbound queue closed; udp listener exiting");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(peer = %peer, bytes = n, error = %e, "dropping undecodable datagram");
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "udp receive error");
                    }
                }
            }
        }
    }
    info!("udp listener stopped");
}

#[async_trait]
impl BridgeAdapter for UdpTransport {
    async fn send(&self, message: BridgeMessage) -> Result<(), BotError> {
        if let Some(limiter) = &self.limiter
            && limiter.check().is_err()
        {
            warn!(address = %message.address, "outbound rate limit hit; message dropped");
            return Err(BotError::TransportUnavailable(
                "outbound rate limit exceeded".to_string(),
            ));
        }
        let packet = osc::encode(&message)?;
        self.socket
            .send_to(&packet, self.remote)
            .await
            .map_err(|e| BotError::TransportUnavailable(format!("udp send to {}: {e}", self.remote)))?;
        debug!(address = %message.address, remote = %self.remote, "datagram sent");
        Ok(())
    }

    fn initial_state(&self) -> LinkState {
        LinkState::Ready
    }

    fn listening_on(&self) -> String {
        self.local.to_string()
    }

    fn sending_to(&self) -> String {
        self.remote.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use worldbot_types::OscArg;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn datagrams_are_decoded_onto_the_queue_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let (transport, handle) = UdpTransport::bind(
            UdpConfig {
                listen: loopback(),
                remote: loopback(),
                max_sends_per_second: None,
            },
            tx,
        )
        .await
        .unwrap();

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        for text in ["one", "two"] {
            let packet =
                osc::encode(&BridgeMessage::new("/bot/chat", vec![OscArg::from(text)])).unwrap();
            peer.send_to(&packet, transport.local_addr()).await.unwrap();
        }

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.args[0].as_str(), Some("one"));
        assert_eq!(second.args[0].as_str(), Some("two"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn garbage_datagram_is_dropped_and_listener_survives() {
        let (tx, mut rx) = mpsc::channel(16);
        let (transport, handle) = UdpTransport::bind(
            UdpConfig {
                listen: loopback(),
                remote: loopback(),
                max_sends_per_second: None,
            },
            tx,
        )
        .await
        .unwrap();

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        peer.send_to(b"not osc at all", transport.local_addr()).await.unwrap();
        let good = osc::encode(&BridgeMessage::new("/bot/chat", vec![OscArg::from("ok")])).unwrap();
        peer.send_to(&good, transport.local_addr()).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.args[0].as_str(), Some("ok"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn send_reaches_remote_peer() {
        let peer = UdpSocket::bind(loopback()).await.unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let (transport, handle) = UdpTransport::bind(
            UdpConfig {
                listen: loopback(),
                remote: peer.local_addr().unwrap(),
                max_sends_per_second: None,
            },
            tx,
        )
        .await
        .unwrap();

        transport
            .send(BridgeMessage::new("/bot/chat", vec![OscArg::from("hello")]))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let decoded = osc::decode(&buf[..n]).unwrap();
        assert_eq!(decoded[0].args[0].as_str(), Some("hello"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rate_limit_drops_excess_sends() {
        let peer = UdpSocket::bind(loopback()).await.unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let (transport, handle) = UdpTransport::bind(
            UdpConfig {
                listen: loopback(),
                remote: peer.local_addr().unwrap(),
                max_sends_per_second: NonZeroU32::new(1),
            },
            tx,
        )
        .await
        .unwrap();

        let msg = BridgeMessage::new("/bot/chat", vec![OscArg::from("x")]);
        assert!(transport.send(msg.clone()).await.is_ok());
        assert!(matches!(
            transport.send(msg).await,
            Err(BotError::TransportUnavailable(_))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn bind_conflict_reports_transport_unavailable() {
        let taken = UdpSocket::bind(loopback()).await.unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let result = UdpTransport::bind(
            UdpConfig {
                listen: taken.local_addr().unwrap(),
                remote: loopback(),
                max_sends_per_second: None,
            },
            tx,
        )
        .await;
        assert!(matches!(result, Err(BotError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn shutdown_stops_listener() {
        let (tx, _rx) = mpsc::channel(4);
        let (transport, handle) = UdpTransport::bind(
            UdpConfig {
                listen: loopback(),
                remote: loopback(),
                max_sends_per_second: None,
            },
            tx,
        )
        .await
        .unwrap();
        assert_eq!(transport.initial_state(), LinkState::Ready);

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("listener must stop promptly");
    }
}

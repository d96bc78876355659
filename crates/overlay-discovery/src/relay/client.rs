//! Relay client session.

use super::protocol::{RelayError, RelayErrorCode, RelayMessage};
use super::MAX_RELAY_PACKET_SIZE;
use async_trait::async_trait;
use overlay_crypto::PublicKey;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time;

/// A payload delivered by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPacket {
    /// Identity the sender registered under
    pub source: PublicKey,
    /// Sealed payload
    pub data: Vec<u8>,
}

/// An established session with a relay, addressed by identity.
#[async_trait]
pub trait RelaySession: Send + Sync {
    /// Identity this session is registered under.
    fn local_key(&self) -> PublicKey;

    /// Forward `payload` to whoever is registered as `dest`.
    async fn send(&self, dest: PublicKey, payload: &[u8]) -> Result<(), RelayError>;

    /// Wait for the next packet addressed to this session.
    ///
    /// Any error means the session is unusable.
    async fn recv(&self) -> Result<RelayPacket, RelayError>;

    /// Refresh the relay's idle timer.
    async fn keepalive(&self) -> Result<(), RelayError>;

    /// Leave the relay and unblock any pending [`recv`](Self::recv).
    async fn close(&self) -> Result<(), RelayError>;
}

/// UDP relay client
pub struct RelayClient {
    node_id: PublicKey,
    relay_addr: SocketAddr,
    socket: UdpSocket,
    closed: watch::Sender<bool>,
}

impl RelayClient {
    /// Connect and register with a relay server
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be set up, the relay does not
    /// acknowledge within `timeout`, or it refuses the registration.
    pub async fn connect(
        addr: SocketAddr,
        node_id: PublicKey,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let bind: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(addr).await?;

        let register = RelayMessage::Register {
            node_id: node_id.to_bytes(),
        };
        socket.send(&register.to_bytes()?).await?;

        let mut buf = vec![0u8; MAX_RELAY_PACKET_SIZE];
        let len = time::timeout(timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| RelayError::Timeout)??;

        match RelayMessage::from_bytes(&buf[..len])? {
            RelayMessage::RegisterAck { success: true, .. } => {}
            RelayMessage::RegisterAck { error, .. } => {
                return Err(RelayError::Rejected(
                    error.unwrap_or_else(|| "registration failed".to_string()),
                ));
            }
            RelayMessage::Error { code, .. } => return Err(code.into()),
            _ => return Err(RelayError::InvalidMessage),
        }

        tracing::debug!(relay = %addr, node = %node_id.short_string(), "Registered with relay");

        let (closed, _) = watch::channel(false);
        Ok(Self {
            node_id,
            relay_addr: addr,
            socket,
            closed,
        })
    }

    /// Get relay server address
    #[must_use]
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    async fn send_message(&self, msg: &RelayMessage) -> Result<(), RelayError> {
        if *self.closed.borrow() {
            return Err(RelayError::Closed);
        }
        self.socket.send(&msg.to_bytes()?).await?;
        Ok(())
    }

    async fn next_packet(&self) -> Result<RelayPacket, RelayError> {
        let mut buf = vec![0u8; MAX_RELAY_PACKET_SIZE];

        loop {
            let len = self.socket.recv(&mut buf).await?;
            let msg = match RelayMessage::from_bytes(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("Dropping undecodable relay frame: {e}");
                    continue;
                }
            };

            match msg {
                RelayMessage::RecvPacket { src_id, payload } => {
                    return Ok(RelayPacket {
                        source: PublicKey::from_bytes(src_id),
                        data: payload,
                    });
                }
                // A stale peer is not a dead session
                RelayMessage::Error {
                    code: RelayErrorCode::PeerNotFound,
                    message,
                } => {
                    tracing::debug!(relay = %self.relay_addr, "Relay could not deliver: {message}");
                }
                RelayMessage::Error { code, message } => {
                    tracing::warn!(relay = %self.relay_addr, ?code, "Relay error: {message}");
                    return Err(code.into());
                }
                other => {
                    tracing::trace!(kind = other.message_type(), "Ignoring relay message");
                }
            }
        }
    }
}

#[async_trait]
impl RelaySession for RelayClient {
    fn local_key(&self) -> PublicKey {
        self.node_id
    }

    async fn send(&self, dest: PublicKey, payload: &[u8]) -> Result<(), RelayError> {
        self.send_message(&RelayMessage::SendPacket {
            dest_id: dest.to_bytes(),
            payload: payload.to_vec(),
        })
        .await
    }

    async fn recv(&self) -> Result<RelayPacket, RelayError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(RelayError::Closed);
        }

        tokio::select! {
            _ = closed.changed() => Err(RelayError::Closed),
            packet = self.next_packet() => packet,
        }
    }

    async fn keepalive(&self) -> Result<(), RelayError> {
        self.send_message(&RelayMessage::Keepalive).await
    }

    async fn close(&self) -> Result<(), RelayError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        self.socket.send(&RelayMessage::Disconnect.to_bytes()?).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("node_id", &self.node_id)
            .field("relay_addr", &self.relay_addr)
            .finish_non_exhaustive()
    }
}

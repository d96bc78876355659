//! Relay server for forwarding packets between peers.

use super::MAX_RELAY_PACKET_SIZE;
use super::protocol::{NodeId, RelayError, RelayErrorCode, RelayMessage};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Client connection information
#[derive(Debug, Clone)]
struct ClientConnection {
    /// Client's socket address
    addr: SocketAddr,
    /// Last seen time
    last_seen: Instant,
}

impl ClientConnection {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    fn is_alive(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() < timeout
    }
}

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Maximum number of concurrent clients
    pub max_clients: usize,
    /// Clients silent for longer than this are dropped
    pub client_timeout: Duration,
    /// How often idle clients are swept
    pub cleanup_interval: Duration,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 10_000,
            client_timeout: Duration::from_secs(90),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// DERP-style relay server
///
/// Forwards sealed payloads between registered identities. It never sees
/// plaintext; registration is by public key alone.
///
/// An identity belongs to the first address that registers it. Registering
/// the same key from another address is refused until the owner sends
/// `Disconnect` or goes silent for `client_timeout`.
pub struct RelayServer {
    local_addr: SocketAddr,
    clients: Arc<RwLock<HashMap<NodeId, ClientConnection>>>,
    socket: UdpSocket,
    config: RelayServerConfig,
}

impl RelayServer {
    /// Create a new relay server
    ///
    /// # Errors
    ///
    /// Returns error if socket binding fails.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, RelayError> {
        Self::bind_with_config(bind_addr, RelayServerConfig::default()).await
    }

    /// Create a new relay server with custom configuration
    ///
    /// # Errors
    ///
    /// Returns error if socket binding fails.
    pub async fn bind_with_config(
        bind_addr: SocketAddr,
        config: RelayServerConfig,
    ) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            local_addr,
            clients: Arc::new(RwLock::new(HashMap::new())),
            socket,
            config,
        })
    }

    /// Address the server is actually bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Receive errors are logged and skipped, so this only returns `Ok`.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!(addr = %self.local_addr, "Relay server listening");

        let mut cleanup = tokio::time::interval(self.config.cleanup_interval);
        let mut buf = vec![0u8; MAX_RELAY_PACKET_SIZE];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = cleanup.tick() => self.expire_idle().await,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => match RelayMessage::from_bytes(&buf[..len]) {
                        Ok(msg) => self.handle_message(msg, from).await,
                        Err(_) => {
                            self.send_error(from, RelayErrorCode::InvalidMessage, "Invalid message")
                                .await;
                        }
                    },
                    Err(e) => tracing::warn!("Relay receive error: {e}"),
                },
            }
        }

        tracing::info!(addr = %self.local_addr, "Relay server stopped");
        Ok(())
    }

    async fn handle_message(&self, msg: RelayMessage, from: SocketAddr) {
        match msg {
            RelayMessage::Register { node_id } => {
                self.handle_register(node_id, from).await;
            }
            RelayMessage::SendPacket { dest_id, payload } => {
                // Extract sender's node_id by reverse lookup
                if let Some(sender_id) = self.touch_by_addr(from).await {
                    self.handle_send_packet(sender_id, dest_id, payload, from)
                        .await;
                } else {
                    self.send_error(from, RelayErrorCode::NotRegistered, "Not registered")
                        .await;
                }
            }
            RelayMessage::Ping { nonce } => {
                self.send_to(from, &RelayMessage::Pong { nonce }).await;
            }
            RelayMessage::Keepalive => {
                self.touch_by_addr(from).await;
            }
            RelayMessage::Disconnect => {
                let mut clients = self.clients.write().await;
                clients.retain(|_, client| client.addr != from);
            }
            other => {
                tracing::trace!(%from, kind = other.message_type(), "Ignoring relay message");
            }
        }
    }

    async fn handle_register(&self, node_id: NodeId, from: SocketAddr) {
        let mut clients = self.clients.write().await;

        if clients.len() >= self.config.max_clients && !clients.contains_key(&node_id) {
            drop(clients);
            self.send_error(from, RelayErrorCode::ServerFull, "Server at capacity")
                .await;
            return;
        }

        // A live identity stays bound to its address until it disconnects or expires
        if let Some(existing) = clients.get(&node_id) {
            if existing.addr != from && existing.is_alive(self.config.client_timeout) {
                drop(clients);
                tracing::debug!(%from, "Relay identity already registered elsewhere");
                self.send_to(
                    from,
                    &RelayMessage::RegisterAck {
                        success: false,
                        error: Some("node id already registered".to_string()),
                    },
                )
                .await;
                return;
            }
        }
        clients.insert(node_id, ClientConnection::new(from));
        drop(clients);

        tracing::debug!(%from, "Relay client registered");
        self.send_to(
            from,
            &RelayMessage::RegisterAck {
                success: true,
                error: None,
            },
        )
        .await;
    }

    async fn handle_send_packet(
        &self,
        src_id: NodeId,
        dest_id: NodeId,
        payload: Vec<u8>,
        from: SocketAddr,
    ) {
        let dest_addr = self.clients.read().await.get(&dest_id).map(|c| c.addr);

        match dest_addr {
            Some(dest_addr) => {
                self.send_to(dest_addr, &RelayMessage::RecvPacket { src_id, payload })
                    .await;
            }
            None => {
                self.send_error(from, RelayErrorCode::PeerNotFound, "Peer not found")
                    .await;
            }
        }
    }

    async fn send_error(&self, addr: SocketAddr, code: RelayErrorCode, message: &str) {
        let error = RelayMessage::Error {
            code,
            message: message.to_string(),
        };
        self.send_to(addr, &error).await;
    }

    async fn send_to(&self, addr: SocketAddr, msg: &RelayMessage) {
        let sent = match msg.to_bytes() {
            Ok(bytes) => self.socket.send_to(&bytes, addr).await.map(|_| ()).map_err(RelayError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::debug!(%addr, kind = msg.message_type(), "Relay send failed: {e}");
        }
    }

    /// Refresh and return the identity registered at `addr`.
    async fn touch_by_addr(&self, addr: SocketAddr) -> Option<NodeId> {
        let mut clients = self.clients.write().await;
        clients
            .iter_mut()
            .find(|(_, client)| client.addr == addr)
            .map(|(node_id, client)| {
                client.touch();
                *node_id
            })
    }

    async fn expire_idle(&self) {
        let timeout = self.config.client_timeout;
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|_, client| client.is_alive(timeout));
        if clients.len() < before {
            tracing::debug!(expired = before - clients.len(), "Expired idle relay clients");
        }
    }

    /// Get number of connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

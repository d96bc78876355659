//! The receiving side of an overlay session.

use crate::auth::ClientAuth;
use crate::config::OverlayConfig;
use crate::error::{OverlayError, Result};
use crate::fanout::{NodeChannels, SharedReceiver};
use crate::handler::MessageHandler;
use crate::human::{HumanLog, TracingHumanLog};
use crate::node::Node;
use crate::region::pick_relay_home;
use crate::relay_channel::{self, RelayChannel};
use crate::shutdown::Shutdown;
use crate::state::{LastNode, PublicEndpoint};
use crate::stun_channel::{self, StunChannel, StunSettings};
use overlay_crypto::{LocalIdentity, PublicKey, SessionSealer, SharedCredential};
use overlay_discovery::{
    LatencyProber, PathProber, RegionId, RelayClient, RelayError, RelayMap, RelaySession,
};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Tunnel address handed to the data plane.
pub const OVERLAY_IPV6: Ipv6Addr = Ipv6Addr::new(0xfd7a, 0x115c, 0xa1e0, 0, 0, 0, 0, 1);

/// Shared wiring every channel loop runs with.
#[derive(Clone)]
pub(crate) struct ChannelContext {
    pub handler: MessageHandler,
    pub outbound: SharedReceiver<Node>,
    pub human: Arc<dyn HumanLog>,
    pub shutdown: Shutdown,
}

/// One overlay session, as seen by the host that hands out the
/// authorization bundle.
///
/// Typical use: [`pick_relay_home`](Self::pick_relay_home), then
/// [`listen_stun`](Self::listen_stun) and [`listen_relay`](Self::listen_relay),
/// then give the peer [`client_auth`](Self::client_auth).
pub struct Receive {
    config: OverlayConfig,
    relay_map: RelayMap,
    local: LocalIdentity,
    shared: SharedCredential,
    handler: MessageHandler,
    endpoint: Arc<PublicEndpoint>,
    // 0 until a region is picked
    region: AtomicU16,
    inbound_rx: Mutex<Option<mpsc::Receiver<Node>>>,
    outbound_tx: mpsc::Sender<Node>,
    outbound_rx: SharedReceiver<Node>,
    human: Arc<dyn HumanLog>,
}

impl Receive {
    /// New session with fresh keys, logging human lines through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::InvalidConfig`] for a configuration that fails
    /// validation.
    pub fn new(config: OverlayConfig, relay_map: RelayMap) -> Result<Self> {
        Self::with_human_log(config, relay_map, Arc::new(TracingHumanLog))
    }

    /// New session with fresh keys and a custom human log.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::InvalidConfig`] for a configuration that fails
    /// validation.
    pub fn with_human_log(
        config: OverlayConfig,
        relay_map: RelayMap,
        human: Arc<dyn HumanLog>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| OverlayError::InvalidConfig(e.to_string().into()))?;

        let local = LocalIdentity::generate();
        let shared = SharedCredential::generate();
        let sealer = Arc::new(SessionSealer::receiver(&local, &shared.public_key())?);

        let channels = NodeChannels::new(config.channels.capacity);
        let handler = MessageHandler::new(
            sealer,
            Arc::new(LastNode::new()),
            channels.inbound_tx,
            Arc::clone(&human),
        );

        tracing::debug!(
            local = %local.public_key().short_string(),
            shared = %shared.public_key().short_string(),
            "Overlay session keys generated"
        );

        Ok(Self {
            config,
            relay_map,
            local,
            shared,
            handler,
            endpoint: Arc::new(PublicEndpoint::new()),
            region: AtomicU16::new(0),
            inbound_rx: Mutex::new(Some(channels.inbound_rx)),
            outbound_tx: channels.outbound_tx,
            outbound_rx: channels.outbound_rx,
            human,
        })
    }

    /// Overlay addresses for the tunnel layer.
    #[must_use]
    pub fn ips(&self) -> Vec<IpAddr> {
        vec![IpAddr::V6(OVERLAY_IPV6)]
    }

    /// Public key peers seal to.
    #[must_use]
    pub fn local_public_key(&self) -> PublicKey {
        self.local.public_key()
    }

    /// Public half of the shared credential.
    #[must_use]
    pub fn shared_public_key(&self) -> PublicKey {
        self.shared.public_key()
    }

    /// Measure the relay map and settle on a home region.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::RegionSelection`] if measurement fails.
    pub async fn pick_relay_home(&self, prober: &dyn PathProber) -> Result<RegionId> {
        let region = pick_relay_home(
            prober,
            &self.relay_map,
            self.config.relay.default_region,
            &self.config.relay.default_region_name,
            &*self.human,
        )
        .await?;
        self.set_relay_home(region);
        Ok(region)
    }

    /// [`pick_relay_home`](Self::pick_relay_home) with a [`LatencyProber`]
    /// using the configured probe timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::RegionSelection`] if the relay map is empty.
    pub async fn pick_relay_home_by_latency(&self) -> Result<RegionId> {
        let prober = LatencyProber::new(self.config.relay.probe_timeout());
        self.pick_relay_home(&prober).await
    }

    /// Use `region` as the relay home without measuring. Region 0 clears it.
    pub fn set_relay_home(&self, region: RegionId) {
        self.region.store(region, Ordering::Release);
    }

    /// Relay home, once picked.
    #[must_use]
    pub fn relay_home(&self) -> Option<RegionId> {
        match self.region.load(Ordering::Acquire) {
            0 => None,
            region => Some(region),
        }
    }

    /// Public UDP endpoint learned over STUN, once known.
    #[must_use]
    pub fn stun_addr(&self) -> Option<SocketAddr> {
        self.endpoint.get()
    }

    /// Bundle to hand to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::NotReady`] before a relay home is picked.
    pub fn client_auth(&self) -> Result<ClientAuth> {
        let region = self
            .relay_home()
            .ok_or(OverlayError::not_ready("relay home not picked"))?;

        Ok(ClientAuth {
            overlay_private_key: self.shared.clone(),
            receiver_public_key: self.local.public_key(),
            receiver_stun_addr: self.stun_addr(),
            receiver_relay_region: region,
        })
    }

    /// Nodes received from the peer. Can be taken once.
    pub fn take_recv(&self) -> Option<mpsc::Receiver<Node>> {
        self.inbound_rx.lock().take()
    }

    /// Where the tunnel layer pushes local node changes.
    #[must_use]
    pub fn send(&self) -> mpsc::Sender<Node> {
        self.outbound_tx.clone()
    }

    pub(crate) fn context(&self, shutdown: Shutdown) -> ChannelContext {
        ChannelContext {
            handler: self.handler.clone(),
            outbound: self.outbound_rx.clone(),
            human: Arc::clone(&self.human),
            shutdown,
        }
    }

    /// Open the STUN channel.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Resolve`] or [`OverlayError::Bind`] if the
    /// socket cannot be set up.
    pub async fn listen_stun(&self, shutdown: Shutdown) -> Result<StunChannel> {
        let stun = &self.config.stun;
        let bind: SocketAddr = stun
            .bind_addr
            .parse()
            .map_err(|e| OverlayError::InvalidConfig(format!("bind address: {e}").into()))?;

        let server = tokio::net::lookup_host(stun.server.as_str())
            .await
            .map_err(|e| OverlayError::Resolve(format!("{}: {e}", stun.server)))?
            .find(|addr| addr.is_ipv4() == bind.is_ipv4())
            .ok_or_else(|| OverlayError::Resolve(stun.server.clone()))?;

        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| OverlayError::Bind(e.to_string()))?;

        stun_channel::spawn(
            socket,
            StunSettings {
                server,
                probe_interval: stun.probe_interval(),
                max_datagram_size: stun.max_datagram_size,
            },
            Arc::clone(&self.endpoint),
            self.context(shutdown),
        )
    }

    /// Connect to the relay home and open the relay channel.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::NotReady`] before a relay home is picked and
    /// [`OverlayError::RelayConnect`] if the session cannot be established.
    pub async fn listen_relay(&self, shutdown: Shutdown) -> Result<RelayChannel> {
        let region = self
            .relay_home()
            .ok_or(OverlayError::not_ready("relay home not picked"))?;
        let connect_err = |source| OverlayError::RelayConnect { region, source };

        let entry = self.relay_map.get(region).ok_or_else(|| {
            connect_err(RelayError::Resolve(format!("region {region} not in relay map")))
        })?;
        let addr = entry.resolve().await.map_err(connect_err)?;
        let client = RelayClient::connect(
            addr,
            self.local.public_key(),
            self.config.relay.connect_timeout(),
        )
        .await
        .map_err(connect_err)?;

        tracing::info!(region, name = %entry.region_name, relay = %addr, "Relay session established");
        Ok(self.listen_relay_with(Arc::new(client), region, shutdown))
    }

    /// Open the relay channel over an existing session.
    pub fn listen_relay_with(
        &self,
        session: Arc<dyn RelaySession>,
        region: RegionId,
        shutdown: Shutdown,
    ) -> RelayChannel {
        relay_channel::spawn(
            session,
            region,
            self.config.relay.keepalive_interval(),
            self.context(shutdown),
        )
    }
}

impl std::fmt::Debug for Receive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receive")
            .field("local", &self.local.public_key())
            .field("region", &self.relay_home())
            .field("stun_addr", &self.stun_addr())
            .finish_non_exhaustive()
    }
}

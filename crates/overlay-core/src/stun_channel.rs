//! Direct UDP channel on a STUN-probed socket.
//!
//! One socket carries three things at once: periodic Binding requests to the
//! STUN server, the server's responses, and sealed overlay messages to and
//! from peers. Incoming datagrams are told apart with a STUN header sniff.

use crate::error::{OverlayError, Result};
use crate::handler::{Transport, report_failure};
use crate::receive::ChannelContext;
use crate::state::{EndpointChange, PeerTable, PublicEndpoint};
use overlay_discovery::StunMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handles to a running STUN channel.
#[derive(Debug)]
pub struct StunChannel {
    /// Local address of the shared socket
    pub local_addr: SocketAddr,
    /// Peers heard from on this channel, by node key
    pub peers: Arc<PeerTable<SocketAddr>>,
    /// Fires once the first usable public endpoint is known
    pub ready: Readiness,
    /// Ends with the channel; `Err` for a transport-fatal failure
    pub task: JoinHandle<Result<()>>,
}

/// Readiness of a STUN channel: set once, with the first usable endpoint.
///
/// Any number of tasks may wait on clones of it. If the channel ends before an
/// endpoint was learned, waiters stay pending.
#[derive(Debug, Clone)]
pub struct Readiness {
    rx: watch::Receiver<Option<SocketAddr>>,
}

impl Readiness {
    /// First usable endpoint, if already known.
    #[must_use]
    pub fn get(&self) -> Option<SocketAddr> {
        *self.rx.borrow()
    }

    /// Wait for the first usable endpoint.
    pub async fn wait(&self) -> SocketAddr {
        let mut rx = self.rx.clone();
        loop {
            if let Some(addr) = *rx.borrow_and_update() {
                return addr;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        if let Some(addr) = *rx.borrow() {
            return addr;
        }
        std::future::pending().await
    }
}

pub(crate) struct StunSettings {
    pub server: SocketAddr,
    pub probe_interval: Duration,
    pub max_datagram_size: usize,
}

/// Start the channel on an already bound socket.
pub(crate) fn spawn(
    socket: UdpSocket,
    settings: StunSettings,
    endpoint: Arc<PublicEndpoint>,
    ctx: ChannelContext,
) -> Result<StunChannel> {
    let local_addr = socket
        .local_addr()
        .map_err(|e| OverlayError::Bind(e.to_string()))?;
    let socket = Arc::new(socket);
    let peers = Arc::new(PeerTable::new());
    let (ready_tx, ready_rx) = watch::channel(None);

    tracing::debug!(%local_addr, server = %settings.server, "STUN channel starting");

    let task = {
        let peers = Arc::clone(&peers);
        tokio::spawn(async move {
            let shutdown = ctx.shutdown.clone();
            let result = tokio::select! {
                result = receive_loop(&socket, &settings, &endpoint, &peers, &ctx, ready_tx) => result,
                () = probe_loop(&socket, &settings, &ctx) => Ok(()),
                () = broadcast_loop(&socket, &peers, &ctx) => Ok(()),
                () = shutdown.cancelled() => Ok(()),
            };
            tracing::debug!(%local_addr, "STUN channel stopped");
            result
        })
    };

    Ok(StunChannel {
        local_addr,
        peers,
        ready: Readiness { rx: ready_rx },
        task,
    })
}

async fn probe_loop(socket: &UdpSocket, settings: &StunSettings, ctx: &ChannelContext) {
    let mut ticker = tokio::time::interval(settings.probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick fires immediately
        ticker.tick().await;
        let request = StunMessage::binding_request().encode();
        if let Err(e) = socket.send_to(&request, settings.server).await {
            ctx.human
                .warn(&format!("Failed to write STUN request on overlay: {e}"));
        }
    }
}

async fn broadcast_loop(socket: &UdpSocket, peers: &PeerTable<SocketAddr>, ctx: &ChannelContext) {
    while let Some(node) = ctx.outbound.recv().await {
        let sealed = match ctx.handler.publish(node) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::error!("Failed to seal node update: {e}");
                continue;
            }
        };

        for (key, addr) in peers.snapshot() {
            if let Err(e) = socket.send_to(&sealed, addr).await {
                ctx.human.warn(&format!(
                    "Failed to send updated node over udp to {} at {addr}: {e}",
                    key.short_string()
                ));
            }
        }
    }

    // Every outbound sender is gone; keep serving inbound traffic
    std::future::pending::<()>().await;
}

async fn receive_loop(
    socket: &UdpSocket,
    settings: &StunSettings,
    endpoint: &PublicEndpoint,
    peers: &PeerTable<SocketAddr>,
    ctx: &ChannelContext,
    ready: watch::Sender<Option<SocketAddr>>,
) -> Result<()> {
    let mut buf = vec![0u8; settings.max_datagram_size];

    loop {
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| OverlayError::SocketRead(e.to_string()))?;
        let datagram = &buf[..len];

        if StunMessage::is_message(datagram) {
            let addr = match StunMessage::decode(datagram).and_then(|m| m.reflexive_address()) {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::error!(%from, "Unusable STUN response, stopping: {e}");
                    return Err(e.into());
                }
            };

            if addr.ip().is_unspecified() || addr.port() == 0 {
                let err = OverlayError::AddressConversion(addr.to_string());
                report_failure(&*ctx.human, &err, Transport::Stun, &from);
                continue;
            }

            match endpoint.observe(addr) {
                EndpointChange::Discovered => ctx.human.info(&format!("STUN address is {addr}")),
                EndpointChange::Changed { previous } => ctx.human.warn(&format!(
                    "STUN address changed, this may cause issues; {previous}->{addr}"
                )),
                EndpointChange::Unchanged => {}
            }
            if ready.borrow().is_none() {
                ready.send_replace(Some(addr));
            }
            continue;
        }

        match ctx.handler.handle(datagram, Transport::Stun).await {
            Ok(handled) => {
                peers.insert(handled.sender, from);
                if let Some(reply) = handled.reply {
                    if let Err(e) = socket.send_to(&reply, from).await {
                        ctx.human
                            .warn(&format!("Failed to send overlay response over STUN: {e}"));
                    }
                }
            }
            Err(err) => {
                if !report_failure(&*ctx.human, &err, Transport::Stun, &from) {
                    return Err(err);
                }
            }
        }
    }
}

//! Relay channel: the same protocol, addressed by identity.

use crate::error::{OverlayError, Result};
use crate::handler::{Transport, report_failure};
use crate::receive::ChannelContext;
use crate::state::PeerTable;
use overlay_crypto::PublicKey;
use overlay_discovery::{RegionId, RelaySession};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Consecutive keepalive failures that end the channel.
const MAX_KEEPALIVE_FAILURES: u32 = 3;

/// Handles to a running relay channel.
#[derive(Debug)]
pub struct RelayChannel {
    /// Region the session is connected to
    pub region: RegionId,
    /// Peers heard from on this channel: node key to relay identity
    pub peers: Arc<PeerTable<PublicKey>>,
    /// Ends with the channel; `Err` if the session failed
    pub task: JoinHandle<Result<()>>,
}

/// Run the channel over an established session.
///
/// The session is closed when the channel ends for any reason.
pub(crate) fn spawn(
    session: Arc<dyn RelaySession>,
    region: RegionId,
    keepalive: Duration,
    ctx: ChannelContext,
) -> RelayChannel {
    let peers = Arc::new(PeerTable::new());

    let task = {
        let peers = Arc::clone(&peers);
        tokio::spawn(async move {
            let shutdown = ctx.shutdown.clone();
            let result = tokio::select! {
                result = receive_loop(&*session, &peers, &ctx) => result,
                () = broadcast_loop(&*session, &peers, &ctx) => Ok(()),
                result = keepalive_loop(&*session, keepalive) => result,
                () = shutdown.cancelled() => Ok(()),
            };

            if let Err(e) = session.close().await {
                tracing::debug!(region, "Closing relay session: {e}");
            }
            tracing::debug!(region, "Relay channel stopped");
            result
        })
    };

    RelayChannel {
        region,
        peers,
        task,
    }
}

async fn keepalive_loop(session: &dyn RelaySession, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Registration just refreshed the relay
    ticker.tick().await;

    let mut failures = 0;
    loop {
        ticker.tick().await;
        match session.keepalive().await {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                tracing::warn!(failures, "Relay keepalive failed: {e}");
                if failures >= MAX_KEEPALIVE_FAILURES {
                    tracing::error!("Relay keepalive kept failing, stopping");
                    return Err(OverlayError::RelayKeepalive(e));
                }
            }
        }
    }
}

async fn broadcast_loop(
    session: &dyn RelaySession,
    peers: &PeerTable<PublicKey>,
    ctx: &ChannelContext,
) {
    while let Some(node) = ctx.outbound.recv().await {
        let sealed = match ctx.handler.publish(node) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::error!("Failed to seal node update: {e}");
                continue;
            }
        };

        for (key, relay_key) in peers.snapshot() {
            if let Err(e) = session.send(relay_key, &sealed).await {
                ctx.human.warn(&format!(
                    "Failed to send updated node over relay to {}: {e}",
                    key.short_string()
                ));
            }
        }
    }

    std::future::pending::<()>().await;
}

async fn receive_loop(
    session: &dyn RelaySession,
    peers: &PeerTable<PublicKey>,
    ctx: &ChannelContext,
) -> Result<()> {
    loop {
        let packet = session.recv().await.map_err(|e| {
            tracing::error!("Relay receive failed, stopping: {e}");
            OverlayError::RelayReceive(e)
        })?;
        let source = packet.source;

        match ctx.handler.handle(&packet.data, Transport::Relay).await {
            Ok(handled) => {
                peers.insert(handled.sender, source);
                if let Some(reply) = handled.reply {
                    // Reply failure ends the channel
                    session.send(source, &reply).await.map_err(|e| {
                        ctx.human
                            .warn(&format!("Failed to send overlay response over relay: {e}"));
                        OverlayError::Send(e.to_string())
                    })?;
                }
            }
            Err(err) => {
                if !report_failure(&*ctx.human, &err, Transport::Relay, &source.short_string()) {
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::receive::Receive;
    use crate::shutdown::{Shutdown, ShutdownTrigger};
    use async_trait::async_trait;
    use overlay_discovery::{RelayError, RelayMap, RelayPacket};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Session whose keepalives fail from the given attempt on.
    struct FlakySession {
        fail_from: u32,
        keepalives: AtomicU32,
        closed: AtomicBool,
    }

    impl FlakySession {
        fn new(fail_from: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_from,
                keepalives: AtomicU32::new(0),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl RelaySession for FlakySession {
        fn local_key(&self) -> PublicKey {
            PublicKey::from_bytes([5; 32])
        }

        async fn send(
            &self,
            _dest: PublicKey,
            _payload: &[u8],
        ) -> std::result::Result<(), RelayError> {
            Ok(())
        }

        async fn recv(&self) -> std::result::Result<RelayPacket, RelayError> {
            std::future::pending::<std::result::Result<RelayPacket, RelayError>>().await
        }

        async fn keepalive(&self) -> std::result::Result<(), RelayError> {
            let attempt = self.keepalives.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.fail_from {
                Err(RelayError::Io("unreachable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn close(&self) -> std::result::Result<(), RelayError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn start(session: Arc<FlakySession>) -> (RelayChannel, ShutdownTrigger) {
        let receive = Receive::new(OverlayConfig::default(), RelayMap::new()).unwrap();
        let (trigger, shutdown) = Shutdown::new();
        let channel = spawn(
            session,
            9,
            Duration::from_millis(10),
            receive.context(shutdown),
        );
        (channel, trigger)
    }

    #[tokio::test]
    async fn test_repeated_keepalive_failure_ends_channel() {
        let session = FlakySession::new(2);
        let (channel, _trigger) = start(Arc::clone(&session));

        let result = tokio::time::timeout(Duration::from_secs(2), channel.task)
            .await
            .unwrap()
            .unwrap();
        let err = result.unwrap_err();
        assert!(err.is_transport_fatal());
        assert!(matches!(err, OverlayError::RelayKeepalive(RelayError::Io(_))));
        assert_eq!(
            session.keepalives.load(Ordering::SeqCst),
            1 + MAX_KEEPALIVE_FAILURES
        );
        assert!(session.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_healthy_keepalive_keeps_channel() {
        let session = FlakySession::new(u32::MAX);
        let (channel, _trigger) = start(Arc::clone(&session));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!channel.task.is_finished());
        assert!(session.keepalives.load(Ordering::SeqCst) > MAX_KEEPALIVE_FAILURES);
        channel.task.abort();
    }
}

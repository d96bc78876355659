//! Relay region selection by measured path quality.

use super::MAX_RELAY_PACKET_SIZE;
use super::map::{RegionId, RelayMap};
use super::protocol::{RelayError, RelayMessage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;

/// Outcome of one path-quality measurement round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetcheckReport {
    /// Region the prober recommends, if any answered
    pub preferred_region: Option<RegionId>,
    /// Round-trip time per region that answered
    pub latencies: BTreeMap<RegionId, Duration>,
}

impl NetcheckReport {
    /// Build a report from measured latencies, preferring the fastest region.
    ///
    /// Ties go to the lower region id.
    #[must_use]
    pub fn from_latencies(latencies: BTreeMap<RegionId, Duration>) -> Self {
        let preferred_region = latencies
            .iter()
            .min_by_key(|(id, rtt)| (**rtt, **id))
            .map(|(id, _)| *id);
        Self {
            preferred_region,
            latencies,
        }
    }
}

/// Path-quality measurement over a set of candidate regions.
#[async_trait]
pub trait PathProber: Send + Sync {
    /// Measure `map` and report the preferred region.
    ///
    /// Unreachable regions are left out of the report. Errors are reserved
    /// for the measurement itself failing.
    async fn probe(&self, map: &RelayMap) -> Result<NetcheckReport, RelayError>;
}

/// Measures each region's relay with a `Ping`/`Pong` round trip.
#[derive(Debug, Clone)]
pub struct LatencyProber {
    timeout: Duration,
}

impl LatencyProber {
    /// Prober that gives each region `timeout` to answer.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LatencyProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl PathProber for LatencyProber {
    async fn probe(&self, map: &RelayMap) -> Result<NetcheckReport, RelayError> {
        if map.is_empty() {
            return Err(RelayError::NoRegions);
        }

        let mut probes = JoinSet::new();
        for region in map.iter() {
            let region = region.clone();
            let timeout = self.timeout;
            probes.spawn(async move {
                let rtt = match region.resolve().await {
                    Ok(addr) => measure_rtt(addr, timeout).await,
                    Err(e) => Err(e),
                };
                (region.region_id, rtt)
            });
        }

        let mut latencies = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            let (region_id, rtt) = joined.map_err(|e| RelayError::Internal(e.to_string()))?;
            match rtt {
                Ok(rtt) => {
                    tracing::debug!(region = region_id, ?rtt, "Relay region answered");
                    latencies.insert(region_id, rtt);
                }
                Err(e) => tracing::debug!(region = region_id, "Relay region probe failed: {e}"),
            }
        }

        Ok(NetcheckReport::from_latencies(latencies))
    }
}

/// Round-trip time of one `Ping` to the relay at `addr`.
///
/// # Errors
///
/// Returns [`RelayError::Timeout`] if no matching `Pong` arrives in time.
pub async fn measure_rtt(addr: SocketAddr, timeout: Duration) -> Result<Duration, RelayError> {
    use rand::Rng;

    let bind: SocketAddr = if addr.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(addr).await?;

    let nonce: u64 = rand::thread_rng().r#gen();
    let started = Instant::now();
    socket.send(&RelayMessage::Ping { nonce }.to_bytes()?).await?;

    let wait = async {
        let mut buf = vec![0u8; MAX_RELAY_PACKET_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            if let Ok(RelayMessage::Pong { nonce: echoed }) = RelayMessage::from_bytes(&buf[..len])
            {
                if echoed == nonce {
                    return Ok::<_, RelayError>(started.elapsed());
                }
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| RelayError::Timeout)?
}

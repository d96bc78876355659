//! # DERP-Style Relay
//!
//! Relay path for peers that cannot reach each other directly. Packets are
//! addressed by the public key a client registered under, never by network
//! address, and the relay only ever sees sealed payloads.
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Relay Server  │
//!                    │  (Public IP)    │
//!                    └────────┬────────┘
//!                             │
//!              ┌──────────────┴──────────────┐
//!              │                              │
//!              ▼                              ▼
//!       ┌─────────────┐                ┌─────────────┐
//!       │   Peer A    │                │   Peer B    │
//!       │  (NAT'd)    │                │  (NAT'd)    │
//!       └─────────────┘                └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use overlay_crypto::LocalIdentity;
//! use overlay_discovery::relay::{LatencyProber, PathProber, RelayClient, RelayMap, RelayRegion, RelaySession};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let map: RelayMap = [RelayRegion::new(1, "nyc", "New York City", "relay.example.com:3340")]
//!     .into_iter()
//!     .collect();
//!
//! let report = LatencyProber::default().probe(&map).await?;
//! let region = map.get(report.preferred_region.unwrap_or(1)).unwrap();
//!
//! let me = LocalIdentity::generate().public_key();
//! let client = RelayClient::connect(region.resolve().await?, me, Duration::from_secs(10)).await?;
//!
//! let packet = client.recv().await?;
//! client.send(packet.source, b"sealed bytes").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod map;
pub mod protocol;
pub mod selection;
pub mod server;

pub use client::{RelayClient, RelayPacket, RelaySession};
pub use map::{RegionId, RelayMap, RelayRegion};
pub use protocol::{RelayError, RelayErrorCode, RelayMessage};
pub use selection::{LatencyProber, NetcheckReport, PathProber, measure_rtt};
pub use server::{RelayServer, RelayServerConfig};

/// Maximum relay packet size (64 KB)
pub const MAX_RELAY_PACKET_SIZE: usize = 65536;

/// Relay keepalive interval (30 seconds)
pub const RELAY_KEEPALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Relay connection timeout (10 seconds)
pub const RELAY_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

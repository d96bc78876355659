//! # Overlay Core
//!
//! Pairwise rendezvous and sealed signaling between two overlay peers.
//!
//! A receiver generates a session, picks a relay home and listens on two
//! transports at once. The peer is handed a [`ClientAuth`] bundle out of band
//! and uses it to reach the receiver over either path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Receive                             │
//! │   keys, relay home, last local node, node channels           │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │        StunChannel           │         RelayChannel          │
//! │  STUN probes + direct UDP    │  relay session by identity    │
//! │  PeerTable<SocketAddr>       │  PeerTable<PublicKey>         │
//! ├──────────────────────────────┴───────────────────────────────┤
//! │                       MessageHandler                         │
//! │   open, decode, answer ping / hello / node-update            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use overlay_core::{OverlayConfig, Receive, Shutdown};
//!
//! # async fn run() -> overlay_core::Result<()> {
//! let config = OverlayConfig::default();
//! let receive = Receive::new(config.clone(), config.relay.relay_map())?;
//! receive.pick_relay_home_by_latency().await?;
//!
//! let (trigger, shutdown) = Shutdown::new();
//! let stun = receive.listen_stun(shutdown.clone()).await?;
//! let _relay = receive.listen_relay(shutdown).await?;
//! let _public = stun.ready.wait().await;
//!
//! println!("{}", receive.client_auth()?.encode()?);
//! trigger.trigger();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod human;
pub mod message;
pub mod node;
pub mod receive;
pub mod region;
pub mod relay_channel;
pub mod shutdown;
pub mod state;
pub mod stun_channel;

pub use auth::ClientAuth;
pub use config::{ChannelConfig, OverlayConfig, RelayConfig, StunConfig};
pub use error::{OverlayError, Result};
pub use fanout::{NodeChannels, SharedReceiver};
pub use handler::{Handled, MessageHandler, Transport};
pub use human::{HumanLog, TracingHumanLog};
pub use message::{HostInfo, MessageType, OverlayMessage};
pub use node::Node;
pub use receive::{OVERLAY_IPV6, Receive};
pub use region::pick_relay_home;
pub use relay_channel::RelayChannel;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use state::{EndpointChange, LastNode, PeerTable, PublicEndpoint};
pub use stun_channel::{Readiness, StunChannel};

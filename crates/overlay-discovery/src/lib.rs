//! # Overlay Discovery
//!
//! The two transports the overlay signals over, kept free of any overlay
//! message semantics:
//!
//! - [`stun`]: STUN Binding codec used to learn the public UDP endpoint and to
//!   tell STUN datagrams apart from sealed overlay traffic on a shared socket
//! - [`relay`]: DERP-style relay protocol, client session, region map,
//!   latency-based region probing, and a forwarding server
//!
//! ## Example
//!
//! ```rust
//! use overlay_discovery::stun::StunMessage;
//!
//! let request = StunMessage::binding_request().encode();
//! assert!(StunMessage::is_message(&request));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod relay;
pub mod stun;

pub use relay::{
    LatencyProber, NetcheckReport, PathProber, RegionId, RelayClient, RelayError, RelayMap,
    RelayPacket, RelayRegion, RelayServer, RelaySession,
};
pub use stun::{StunError, StunMessage};

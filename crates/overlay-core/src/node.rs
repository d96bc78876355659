//! Node descriptor exchanged with the peer.

use overlay_crypto::PublicKey;
use overlay_discovery::RegionId;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// One side's current mesh identity and reachability.
///
/// Owned by the tunnel layer; the overlay only copies it around. The default
/// value is the empty descriptor sent before any local node is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node key, also the identity peers are tracked under
    #[serde(default)]
    pub key: PublicKey,
    /// Direct endpoints the node can be reached at
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<SocketAddr>,
    /// Tunnel addresses assigned to the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<IpAddr>,
    /// Home relay region, 0 if none
    #[serde(default)]
    pub relay_region: RegionId,
}

impl Node {
    /// Node with only a key set.
    #[must_use]
    pub fn with_key(key: PublicKey) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }
}

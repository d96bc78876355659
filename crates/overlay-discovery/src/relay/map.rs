//! Relay regions and the map of candidates.

use super::protocol::RelayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Numeric relay region identifier, carried in the authorization bundle.
pub type RegionId = u16;

/// One relay region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRegion {
    /// Region identifier
    pub region_id: RegionId,
    /// Short code, e.g. "nyc"
    pub region_code: String,
    /// Human-readable name, e.g. "New York City"
    pub region_name: String,
    /// Relay server `host:port`
    pub addr: String,
}

impl RelayRegion {
    /// Create a region entry.
    #[must_use]
    pub fn new(
        region_id: RegionId,
        region_code: impl Into<String>,
        region_name: impl Into<String>,
        addr: impl Into<String>,
    ) -> Self {
        Self {
            region_id,
            region_code: region_code.into(),
            region_name: region_name.into(),
            addr: addr.into(),
        }
    }

    /// Resolve the relay server address, preferring IPv4.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Resolve`] if the lookup fails or yields nothing.
    pub async fn resolve(&self) -> Result<SocketAddr, RelayError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(self.addr.as_str())
            .await
            .map_err(|e| RelayError::Resolve(format!("{}: {e}", self.addr)))?
            .collect();

        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| RelayError::Resolve(self.addr.clone()))
    }
}

/// Candidate relay regions keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayMap {
    regions: BTreeMap<RegionId, RelayRegion>,
}

impl RelayMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a region.
    pub fn insert(&mut self, region: RelayRegion) {
        self.regions.insert(region.region_id, region);
    }

    /// Look up a region by id.
    #[must_use]
    pub fn get(&self, id: RegionId) -> Option<&RelayRegion> {
        self.regions.get(&id)
    }

    /// Region ids in ascending order.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }

    /// Iterate regions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &RelayRegion> {
        self.regions.values()
    }

    /// Number of regions
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the map has no regions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl FromIterator<RelayRegion> for RelayMap {
    fn from_iter<I: IntoIterator<Item = RelayRegion>>(iter: I) -> Self {
        let mut map = Self::new();
        for region in iter {
            map.insert(region);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RelayMap {
        [
            RelayRegion::new(7, "sea", "Seattle", "127.0.0.1:3478"),
            RelayRegion::new(1, "nyc", "New York City", "127.0.0.1:3479"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_map_orders_by_id() {
        let map = sample();
        assert_eq!(map.region_ids().collect::<Vec<_>>(), vec![1, 7]);
        assert_eq!(map.len(), 2);
        assert!(!map.is_empty());
    }

    #[test]
    fn test_insert_replaces() {
        let mut map = sample();
        map.insert(RelayRegion::new(7, "sea", "Seattle 2", "127.0.0.1:1"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(7).unwrap().region_name, "Seattle 2");
        assert!(map.get(99).is_none());
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let region = RelayRegion::new(1, "nyc", "New York City", "127.0.0.1:3479");
        assert_eq!(
            region.resolve().await.unwrap(),
            "127.0.0.1:3479".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_garbage() {
        let region = RelayRegion::new(1, "bad", "Bad", "no port here");
        assert!(matches!(
            region.resolve().await,
            Err(RelayError::Resolve(_))
        ));
    }
}

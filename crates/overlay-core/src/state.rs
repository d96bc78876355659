//! Shared peer and address state.

use crate::node::Node;
use dashmap::DashMap;
use overlay_crypto::PublicKey;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;

/// Where a peer was last heard from, per transport.
///
/// Last write wins and entries never expire; a stale entry just fails to
/// deliver until the peer is heard from again.
#[derive(Debug)]
pub struct PeerTable<A> {
    peers: DashMap<PublicKey, A>,
}

impl<A: Clone> PeerTable<A> {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Record `addr` for `key`, returning the address it replaced.
    pub fn insert(&self, key: PublicKey, addr: A) -> Option<A> {
        self.peers.insert(key, addr)
    }

    /// Current address for `key`.
    #[must_use]
    pub fn get(&self, key: &PublicKey) -> Option<A> {
        self.peers.get(key).map(|entry| entry.value().clone())
    }

    /// Copy of every entry.
    ///
    /// Entries inserted while the copy is taken may or may not be included.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(PublicKey, A)> {
        self.peers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of known peers
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is known yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl<A: Clone> Default for PeerTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Most recent local node, published by the broadcasters.
///
/// Readers get an immutable snapshot; publishing swaps the whole value.
#[derive(Debug, Default)]
pub struct LastNode {
    current: RwLock<Option<Arc<Node>>>,
}

impl LastNode {
    /// Nothing published yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published node.
    pub fn publish(&self, node: Arc<Node>) {
        *self.current.write() = Some(node);
    }

    /// Currently published node, if any.
    #[must_use]
    pub fn load(&self) -> Option<Arc<Node>> {
        self.current.read().clone()
    }

    /// Published node, or the empty descriptor before the first publish.
    #[must_use]
    pub fn load_or_default(&self) -> Node {
        self.load().map(|node| (*node).clone()).unwrap_or_default()
    }
}

/// Result of recording a STUN reflexive address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointChange {
    /// First valid address
    Discovered,
    /// Same as before
    Unchanged,
    /// NAT rebinding moved us
    Changed {
        /// Address before the change
        previous: SocketAddr,
    },
}

/// Our public UDP endpoint as seen by the STUN server.
#[derive(Debug, Default)]
pub struct PublicEndpoint {
    addr: Mutex<Option<SocketAddr>>,
}

impl PublicEndpoint {
    /// Not yet discovered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly observed address.
    pub fn observe(&self, addr: SocketAddr) -> EndpointChange {
        let mut current = self.addr.lock();
        let change = match *current {
            None => EndpointChange::Discovered,
            Some(previous) if previous == addr => EndpointChange::Unchanged,
            Some(previous) => EndpointChange::Changed { previous },
        };
        *current = Some(addr);
        change
    }

    /// Last observed address.
    #[must_use]
    pub fn get(&self) -> Option<SocketAddr> {
        *self.addr.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn test_peer_table_last_write_wins() {
        let table: PeerTable<SocketAddr> = PeerTable::new();
        let first: SocketAddr = "192.0.2.1:1000".parse().unwrap();
        let second: SocketAddr = "192.0.2.1:2000".parse().unwrap();

        assert_eq!(table.insert(key(1), first), None);
        assert_eq!(table.insert(key(1), second), Some(first));
        assert_eq!(table.get(&key(1)), Some(second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_peer_table_snapshot() {
        let table: PeerTable<PublicKey> = PeerTable::default();
        assert!(table.is_empty());
        table.insert(key(1), key(10));
        table.insert(key(2), key(20));

        let mut snapshot = table.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![(key(1), key(10)), (key(2), key(20))]);
    }

    #[test]
    fn test_last_node() {
        let last = LastNode::new();
        assert!(last.load().is_none());
        assert_eq!(last.load_or_default(), Node::default());

        last.publish(Arc::new(Node::with_key(key(3))));
        let first = last.load().unwrap();
        last.publish(Arc::new(Node::with_key(key(4))));

        // Earlier readers keep their snapshot
        assert_eq!(first.key, key(3));
        assert_eq!(last.load_or_default().key, key(4));
    }

    #[test]
    fn test_public_endpoint_changes() {
        let endpoint = PublicEndpoint::new();
        let a: SocketAddr = "198.51.100.1:5000".parse().unwrap();
        let b: SocketAddr = "198.51.100.1:6000".parse().unwrap();

        assert_eq!(endpoint.get(), None);
        assert_eq!(endpoint.observe(a), EndpointChange::Discovered);
        assert_eq!(endpoint.observe(a), EndpointChange::Unchanged);
        assert_eq!(endpoint.observe(b), EndpointChange::Changed { previous: a });
        assert_eq!(endpoint.get(), Some(b));
    }
}

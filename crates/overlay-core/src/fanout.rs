//! Node update fan-in and fan-out channels.
//!
//! Inbound carries nodes received from the peer to the tunnel layer.
//! Outbound carries local node changes to whichever transport picks them up
//! first: both channels compete for the same receiver, so each value is
//! broadcast on exactly one transport.

use crate::node::Node;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Receiver shared by competing consumers.
#[derive(Debug)]
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    /// Wrap a receiver for sharing.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next value; `None` once every sender is gone.
    ///
    /// Cancel safe: a value is only taken when this future completes.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

/// Both node channels of one receiver.
#[derive(Debug)]
pub struct NodeChannels {
    /// Handler side of the inbound channel
    pub inbound_tx: mpsc::Sender<Node>,
    /// Tunnel side of the inbound channel
    pub inbound_rx: mpsc::Receiver<Node>,
    /// Tunnel side of the outbound channel
    pub outbound_tx: mpsc::Sender<Node>,
    /// Transport side of the outbound channel
    pub outbound_rx: SharedReceiver<Node>,
}

impl NodeChannels {
    /// Create both channels with `capacity` slots each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx: SharedReceiver::new(outbound_rx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_crypto::PublicKey;

    #[tokio::test]
    async fn test_competing_consumers_each_value_once() {
        let channels = NodeChannels::new(8);
        let a = channels.outbound_rx.clone();
        let b = channels.outbound_rx.clone();

        for i in 0..4u8 {
            channels
                .outbound_tx
                .send(Node::with_key(PublicKey::from_bytes([i; 32])))
                .await
                .unwrap();
        }
        drop(channels.outbound_tx);

        let mut seen = Vec::new();
        loop {
            let next = tokio::select! {
                n = a.recv() => n,
                n = b.recv() => n,
            };
            match next {
                Some(node) => seen.push(node.key.as_bytes()[0]),
                None => break,
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_inbound_channel() {
        let mut channels = NodeChannels::new(1);
        channels.inbound_tx.send(Node::default()).await.unwrap();
        assert_eq!(channels.inbound_rx.recv().await, Some(Node::default()));
    }
}

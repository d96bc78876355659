//! Property tests for the overlay message codec and handler.

use overlay_core::{LastNode, MessageHandler, Node, OverlayMessage, TracingHumanLog, Transport};
use overlay_crypto::{LocalIdentity, PublicKey, SessionSealer, SharedCredential};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

fn arb_node() -> impl Strategy<Value = Node> {
    (
        any::<[u8; 32]>(),
        proptest::collection::vec((any::<[u8; 4]>(), 1u16..), 0..4),
        any::<u16>(),
    )
        .prop_map(|(key, endpoints, relay_region)| Node {
            key: PublicKey::from_bytes(key),
            endpoints: endpoints
                .into_iter()
                .map(|(ip, port)| SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port))
                .collect(),
            addresses: Vec::new(),
            relay_region,
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = OverlayMessage::decode(&bytes);
    }

    #[test]
    fn prop_node_update_carries_sender(node in arb_node()) {
        let encoded = OverlayMessage::NodeUpdate(node.clone()).encode().unwrap();
        let (message, sender) = OverlayMessage::decode(&encoded).unwrap();
        prop_assert_eq!(sender, node.key);
        prop_assert_eq!(message, OverlayMessage::NodeUpdate(node));
    }

    #[test]
    fn prop_handler_rejects_unsealed_input(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let local = LocalIdentity::generate();
        let shared = SharedCredential::generate();
        let sealer = SessionSealer::receiver(&local, &shared.public_key()).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let handler = MessageHandler::new(
            Arc::new(sealer),
            Arc::new(LastNode::new()),
            tx,
            Arc::new(TracingHumanLog),
        );

        let err = runtime()
            .block_on(handler.handle(&bytes, Transport::Stun))
            .unwrap_err();
        prop_assert!(err.is_message_local());
    }
}

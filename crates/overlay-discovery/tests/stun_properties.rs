//! Property tests for the STUN codec.

use overlay_discovery::stun::StunMessage;
use proptest::prelude::*;
use std::net::{IpAddr, SocketAddr};

proptest! {
    #[test]
    fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = StunMessage::decode(&bytes);
        let _ = StunMessage::is_message(&bytes);
    }

    #[test]
    fn prop_reflexive_address_survives_encoding(
        ip in any::<IpAddr>(),
        port in any::<u16>(),
        transaction_id in any::<[u8; 12]>(),
    ) {
        let addr = SocketAddr::new(ip, port);
        let encoded = StunMessage::binding_success(transaction_id, addr).encode();

        prop_assert!(StunMessage::is_message(&encoded));
        let decoded = StunMessage::decode(&encoded).unwrap();
        prop_assert_eq!(decoded.transaction_id, transaction_id);
        prop_assert_eq!(decoded.reflexive_address().unwrap(), addr);
    }
}

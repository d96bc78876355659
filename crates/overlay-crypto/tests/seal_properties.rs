//! Property tests for the session sealer.

use overlay_crypto::{LocalIdentity, SEAL_OVERHEAD, SessionSealer, SharedCredential};
use proptest::prelude::*;

fn pair() -> (SessionSealer, SessionSealer) {
    let local = LocalIdentity::generate();
    let shared = SharedCredential::generate();
    (
        SessionSealer::receiver(&local, &shared.public_key()).unwrap(),
        SessionSealer::sender(&shared, &local.public_key()).unwrap(),
    )
}

proptest! {
    #[test]
    fn prop_open_inverts_seal(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (receiver, sender) = pair();
        let sealed = sender.seal(&payload).unwrap();
        prop_assert_eq!(sealed.len(), payload.len() + SEAL_OVERHEAD);
        prop_assert_eq!(receiver.open(&sealed).unwrap(), payload);
    }

    #[test]
    fn prop_foreign_pair_never_opens(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let (receiver, _) = pair();
        let (_, foreign) = pair();
        let sealed = foreign.seal(&payload).unwrap();
        prop_assert!(receiver.open(&sealed).is_err());
    }

    #[test]
    fn prop_any_bit_flip_rejected(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (receiver, sender) = pair();
        let mut sealed = sender.seal(&payload).unwrap();
        let at = index.index(sealed.len());
        sealed[at] ^= 1 << bit;
        prop_assert!(receiver.open(&sealed).is_err());
    }
}

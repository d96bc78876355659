//! Sealed-box encryption between the two fixed session identities.
//!
//! Wire layout of a sealed message:
//!
//! ```text
//! +----------------+---------------------------+-----------+
//! | nonce (24)     | ciphertext (len)          | tag (16)  |
//! +----------------+---------------------------+-----------+
//! ```
//!
//! The box key is `BLAKE3-derive_key(CONTEXT, DH || receiver_pub || shared_pub)`.
//! The local side computes `DH(local, shared_pub)` and the peer computes
//! `DH(shared, local_pub)`, which agree, so a single sealer covers both
//! directions.

use crate::keys::{LocalIdentity, PublicKey, SharedCredential};
use crate::CryptoError;
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand_core::{CryptoRng, OsRng, RngCore};
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// XChaCha20-Poly1305 nonce size (24 bytes / 192 bits).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// Bytes added to every sealed message.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

const SESSION_CONTEXT: &str = "overlay 2024-06 signaling sealed box v1";

/// Authenticated box bound to one session's key pair.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSealer {
    key: [u8; 32],
}

impl SessionSealer {
    /// Sealer for the instance that owns the local identity.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `shared_public` is a
    /// low-order point.
    pub fn receiver(local: &LocalIdentity, shared_public: &PublicKey) -> Result<Self, CryptoError> {
        let dh = local.exchange(shared_public)?;
        Ok(Self::derive(&dh, &local.public_key(), shared_public))
    }

    /// Sealer for the peer that was handed the shared credential.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `receiver_public` is a
    /// low-order point.
    pub fn sender(
        shared: &SharedCredential,
        receiver_public: &PublicKey,
    ) -> Result<Self, CryptoError> {
        let dh = shared.exchange(receiver_public)?;
        Ok(Self::derive(&dh, receiver_public, &shared.public_key()))
    }

    fn derive(dh: &SharedSecret, receiver: &PublicKey, shared: &PublicKey) -> Self {
        let mut ikm = [0u8; 96];
        ikm[..32].copy_from_slice(dh.as_bytes());
        ikm[32..64].copy_from_slice(receiver.as_bytes());
        ikm[64..].copy_from_slice(shared.as_bytes());
        let key = blake3::derive_key(SESSION_CONTEXT, &ikm);
        ikm.zeroize();
        Self { key }
    }

    /// Seal `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.seal_with_rng(plaintext, &mut OsRng)
    }

    /// Seal `plaintext` drawing the nonce from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn seal_with_rng<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Verify and decrypt a sealed message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] for truncated input, tampered
    /// ciphertext, or a message sealed under any other key pair.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl std::fmt::Debug for SessionSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSealer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (SessionSealer, SessionSealer) {
        let local = LocalIdentity::generate();
        let shared = SharedCredential::generate();
        let receiver = SessionSealer::receiver(&local, &shared.public_key()).unwrap();
        let sender = SessionSealer::sender(&shared, &local.public_key()).unwrap();
        (receiver, sender)
    }

    #[test]
    fn test_both_ends_agree() {
        let (receiver, sender) = session();
        assert_eq!(receiver.key, sender.key);
    }

    #[test]
    fn test_seal_open_both_directions() {
        let (receiver, sender) = session();

        let to_receiver = sender.seal(b"hello").unwrap();
        assert_eq!(receiver.open(&to_receiver).unwrap(), b"hello");

        let to_sender = receiver.seal(b"hello-response").unwrap();
        assert_eq!(sender.open(&to_sender).unwrap(), b"hello-response");
    }

    #[test]
    fn test_sealed_length() {
        let (receiver, _) = session();
        let sealed = receiver.seal(&[7u8; 100]).unwrap();
        assert_eq!(sealed.len(), 100 + SEAL_OVERHEAD);
    }

    #[test]
    fn test_nonces_are_fresh() {
        let (receiver, _) = session();
        let a = receiver.seal(b"same").unwrap();
        let b = receiver.seal(b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn test_other_session_fails_closed() {
        let (receiver, _) = session();
        let (_, stranger) = session();

        let sealed = stranger.seal(b"ping").unwrap();
        assert_eq!(receiver.open(&sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (receiver, sender) = session();
        let mut sealed = sender.seal(b"node-update").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(receiver.open(&sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let (receiver, _) = session();
        assert_eq!(receiver.open(&[]), Err(CryptoError::DecryptionFailed));
        assert_eq!(
            receiver.open(&[0u8; SEAL_OVERHEAD - 1]),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_low_order_shared_key_rejected() {
        let local = LocalIdentity::generate();
        assert!(matches!(
            SessionSealer::receiver(&local, &PublicKey::default()),
            Err(CryptoError::InvalidPublicKey)
        ));
    }
}

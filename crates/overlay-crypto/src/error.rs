//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Sealed message did not open under this session's key pair
    #[error("message failed decryption")]
    DecryptionFailed,

    /// Peer public key is a low-order point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Key material could not be parsed
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

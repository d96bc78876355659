//! # Overlay Crypto
//!
//! Key store and authenticated encryption for the overlay signaling protocol.
//!
//! One overlay session is defined by exactly two X25519 key pairs:
//!
//! | Key | Held by | Secret from the peer? |
//! |-----|---------|-----------------------|
//! | [`LocalIdentity`] | the receiving instance only | yes |
//! | [`SharedCredential`] | the receiving instance *and* the peer | no, it is a bearer credential |
//!
//! Both ends derive the same box key from the pair, so every message in either
//! direction is sealed and opened with one [`SessionSealer`]:
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | X25519 |
//! | KDF | BLAKE3 `derive_key` with a fixed context |
//! | AEAD | XChaCha20-Poly1305, random 192-bit nonce |
//!
//! ## Example
//!
//! ```rust
//! use overlay_crypto::{LocalIdentity, SessionSealer, SharedCredential};
//!
//! let local = LocalIdentity::generate();
//! let shared = SharedCredential::generate();
//!
//! let receiver = SessionSealer::receiver(&local, &shared.public_key()).unwrap();
//! let peer = SessionSealer::sender(&shared, &local.public_key()).unwrap();
//!
//! let sealed = peer.seal(b"ping").unwrap();
//! assert_eq!(receiver.open(&sealed).unwrap(), b"ping");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod seal;

pub use error::CryptoError;
pub use keys::{KEY_SIZE, LocalIdentity, PublicKey, SharedCredential};
pub use seal::{NONCE_SIZE, SEAL_OVERHEAD, SessionSealer, TAG_SIZE};

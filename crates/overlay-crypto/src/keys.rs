//! Session key pairs.
//!
//! [`LocalIdentity`] is the only truly secret key of a session: it never leaves
//! the instance that generated it. [`SharedCredential`] is generated alongside
//! it and handed to the remote peer *including its private half*. Anyone who
//! holds the shared credential can seal to and open from the local identity,
//! so leaking it is equivalent to leaking the session. Both are generated
//! fresh per session and never reused.

use crate::CryptoError;
use rand_core::{CryptoRng, OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// X25519 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// X25519 public key.
///
/// Doubles as the identity under which peers are tracked and the address
/// a relay routes by. The all-zero key is the "unannounced" identity.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Import public key from bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Export public key as bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0
    }

    /// Get bytes as a slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Whether this is the all-zero key.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_SIZE]
    }

    /// Abbreviated form for log lines, e.g. `[3fa9c1d2]`.
    #[must_use]
    pub fn short_string(&self) -> String {
        format!("[{}]", hex::encode(&self.0[..4]))
    }

    fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short_string())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_key(s).map(Self)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The receiving instance's own key pair.
///
/// Its public half is disclosed to the peer as the encryption target; the
/// private half never leaves the process and cannot be exported.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalIdentity {
    secret: StaticSecret,
    #[zeroize(skip)]
    public: PublicKey,
}

impl LocalIdentity {
    /// Generate a fresh identity from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a fresh identity from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Public half, sent to the peer in the authorization bundle.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub(crate) fn exchange(&self, peer: &PublicKey) -> Result<SharedSecret, CryptoError> {
        contributory(self.secret.diffie_hellman(&peer.to_dalek()))
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Bearer credential handed wholesale to the remote peer.
///
/// This is deliberately *not* an identity: its private half is meant to be
/// disclosed to exactly one peer, out of band, once per session. Holding it
/// is what authorizes the peer. Serializes as the hex private key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedCredential {
    secret: StaticSecret,
    #[zeroize(skip)]
    public: PublicKey,
}

impl SharedCredential {
    /// Generate a fresh credential from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a fresh credential from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rng))
    }

    /// Import a credential received from the other side.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    /// Export the private key bytes for the authorization bundle.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Public half, the sealing target shared by both ends.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    pub(crate) fn exchange(&self, peer: &PublicKey) -> Result<SharedSecret, CryptoError> {
        contributory(self.secret.diffie_hellman(&peer.to_dalek()))
    }
}

impl fmt::Debug for SharedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCredential")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl FromStr for SharedCredential {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_key(s).map(Self::from_bytes)
    }
}

impl Serialize for SharedCredential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = self.to_bytes();
        let encoded = hex::encode(bytes);
        bytes.zeroize();
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for SharedCredential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = zeroize::Zeroizing::new(String::deserialize(deserializer)?);
        s.parse().map_err(serde::de::Error::custom)
    }
}

// Rejects low-order peer points.
fn contributory(shared: SharedSecret) -> Result<SharedSecret, CryptoError> {
    if shared.was_contributory() {
        Ok(shared)
    } else {
        Err(CryptoError::InvalidPublicKey)
    }
}

fn decode_hex_key(s: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut bytes = [0u8; KEY_SIZE];
    hex::decode_to_slice(s.trim(), &mut bytes)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    Ok(bytes)
}

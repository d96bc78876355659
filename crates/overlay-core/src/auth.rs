//! Authorization bundle handed to the peer out of band.

use crate::error::{OverlayError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use overlay_crypto::{PublicKey, SessionSealer, SharedCredential};
use overlay_discovery::RegionId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use zeroize::Zeroizing;

/// Everything a peer needs to start signaling with a receiver.
///
/// Carries the shared credential's private key: whoever holds the bundle is
/// authorized, so it must only reach the intended peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuth {
    /// Shared credential, private half included
    pub overlay_private_key: SharedCredential,
    /// Receiver's local identity, the sealing target
    pub receiver_public_key: PublicKey,
    /// Receiver's STUN-discovered endpoint, if known when the bundle was made
    #[serde(default)]
    pub receiver_stun_addr: Option<SocketAddr>,
    /// Receiver's relay home
    pub receiver_relay_region: RegionId,
}

impl ClientAuth {
    /// Compact text form: URL-safe base64 of the JSON bundle.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::InvalidAuth`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        let json = Zeroizing::new(
            serde_json::to_vec(self).map_err(|e| OverlayError::InvalidAuth(e.to_string()))?,
        );
        Ok(URL_SAFE_NO_PAD.encode(&*json))
    }

    /// Parse the text form produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::InvalidAuth`] for bad base64, bad JSON or bad
    /// key material.
    pub fn decode(text: &str) -> Result<Self> {
        let json = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(text.trim())
                .map_err(|e| OverlayError::InvalidAuth(e.to_string()))?,
        );
        serde_json::from_slice(&json).map_err(|e| OverlayError::InvalidAuth(e.to_string()))
    }

    /// Sealer for the peer side of this session.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Crypto`] if the receiver key is unusable.
    pub fn sealer(&self) -> Result<SessionSealer> {
        Ok(SessionSealer::sender(
            &self.overlay_private_key,
            &self.receiver_public_key,
        )?)
    }
}

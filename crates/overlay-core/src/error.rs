//! Error types for the overlay
//!
//! Errors fall into the categories the channels act on:
//!
//! - **Setup-fatal**: binding, resolving, relay connection, relay-home
//!   selection. Returned before a channel starts.
//! - **Transport-fatal**: the established transport is unusable. Ends that
//!   channel's loops and surfaces to its caller; the other channel carries on.
//! - **Message-local**: one message is dropped, the loop continues.
//! - **Protocol violation**: a message from the authenticated peer could not
//!   be decoded. Ends the channel that saw it.

use overlay_crypto::CryptoError;
use overlay_discovery::{RegionId, RelayError, StunError};
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in overlay operations
#[derive(Debug, Error, Clone)]
pub enum OverlayError {
    // ============ Setup Errors ============
    /// Local UDP socket could not be bound
    #[error("Failed to bind socket: {0}")]
    Bind(String),

    /// Name resolution failed
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// Relay session could not be established
    #[error("Failed to connect to relay region {region}: {source}")]
    RelayConnect {
        /// Region being connected to
        region: RegionId,
        /// Underlying relay failure
        source: RelayError,
    },

    /// Path-quality measurement failed
    #[error("Relay region selection failed: {0}")]
    RegionSelection(RelayError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Authorization bundle could not be encoded or decoded
    #[error("Invalid authorization bundle: {0}")]
    InvalidAuth(String),

    /// Operation needs state that is not available yet
    #[error("Not ready: {0}")]
    NotReady(Cow<'static, str>),

    // ============ Transport Errors ============
    /// Malformed or unusable STUN response
    #[error("STUN response unusable: {0}")]
    Stun(#[from] StunError),

    /// Reading from the relay session failed
    #[error("Relay receive failed: {0}")]
    RelayReceive(RelayError),

    /// The relay stopped answering keepalives
    #[error("Relay keepalive failed: {0}")]
    RelayKeepalive(RelayError),

    /// Reading from the UDP socket failed
    #[error("Socket read failed: {0}")]
    SocketRead(String),

    /// Writing to a transport failed
    #[error("Send failed: {0}")]
    Send(String),

    // ============ Message Errors ============
    /// Sealing or opening failed
    #[error("{0}")]
    Crypto(#[from] CryptoError),

    /// Reflexive address could not be used
    #[error("Unusable address: {0}")]
    AddressConversion(String),

    /// Authenticated peer sent something that is not an overlay message
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl OverlayError {
    /// Returns true if only the current message is lost and the loop should
    /// keep going.
    #[must_use]
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            OverlayError::Crypto(CryptoError::DecryptionFailed)
                | OverlayError::AddressConversion(_)
        )
    }

    /// Returns true if the channel that produced this cannot continue.
    #[must_use]
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            OverlayError::Stun(_)
                | OverlayError::RelayReceive(_)
                | OverlayError::RelayKeepalive(_)
                | OverlayError::SocketRead(_)
                | OverlayError::ProtocolViolation(_)
        )
    }

    /// Returns true if this happened before any channel loop started.
    #[must_use]
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            OverlayError::Bind(_)
                | OverlayError::Resolve(_)
                | OverlayError::RelayConnect { .. }
                | OverlayError::RegionSelection(_)
                | OverlayError::InvalidConfig(_)
        )
    }

    /// Create a not-ready error with static context (zero allocation)
    #[must_use]
    pub const fn not_ready(context: &'static str) -> Self {
        OverlayError::NotReady(Cow::Borrowed(context))
    }
}

/// Result type for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_local_errors() {
        assert!(OverlayError::Crypto(CryptoError::DecryptionFailed).is_message_local());
        assert!(OverlayError::AddressConversion("0.0.0.0:0".into()).is_message_local());
        assert!(!OverlayError::ProtocolViolation("bad json".into()).is_message_local());
        assert!(!OverlayError::Crypto(CryptoError::InvalidPublicKey).is_message_local());
    }

    #[test]
    fn test_transport_fatal_errors() {
        assert!(OverlayError::Stun(StunError::MissingAttribute).is_transport_fatal());
        assert!(OverlayError::RelayReceive(RelayError::Closed).is_transport_fatal());
        assert!(OverlayError::RelayKeepalive(RelayError::Timeout).is_transport_fatal());
        assert!(OverlayError::ProtocolViolation("x".into()).is_transport_fatal());
        assert!(!OverlayError::Send("x".into()).is_transport_fatal());
    }

    #[test]
    fn test_setup_fatal_errors() {
        assert!(OverlayError::Bind("in use".into()).is_setup_fatal());
        assert!(
            OverlayError::RelayConnect {
                region: 1,
                source: RelayError::Timeout
            }
            .is_setup_fatal()
        );
        assert!(OverlayError::RegionSelection(RelayError::NoRegions).is_setup_fatal());
        assert!(!OverlayError::not_ready("no region").is_setup_fatal());
    }

    #[test]
    fn test_decryption_message_text() {
        let err = OverlayError::from(CryptoError::DecryptionFailed);
        assert_eq!(err.to_string(), "message failed decryption");
    }
}

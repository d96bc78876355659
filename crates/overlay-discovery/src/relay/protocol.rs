//! Relay protocol message definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node identifier on the relay: the 32-byte public key the client registered.
pub type NodeId = [u8; 32];

/// Relay protocol messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelayMessage {
    /// Client registers with relay
    Register {
        /// Client's node ID
        node_id: NodeId,
    },

    /// Relay acknowledges registration
    RegisterAck {
        /// Whether registration succeeded
        success: bool,
        /// Optional error message
        error: Option<String>,
    },

    /// Client sends packet to another peer through relay
    SendPacket {
        /// Destination node ID
        dest_id: NodeId,
        /// Sealed payload (relay cannot open it)
        payload: Vec<u8>,
    },

    /// Relay forwards packet to recipient
    RecvPacket {
        /// Source node ID
        src_id: NodeId,
        /// Sealed payload
        payload: Vec<u8>,
    },

    /// Latency probe, answered by any relay without registration
    Ping {
        /// Echoed back in the matching `Pong`
        nonce: u64,
    },

    /// Latency probe answer
    Pong {
        /// Nonce of the `Ping` being answered
        nonce: u64,
    },

    /// Keepalive message (no payload)
    Keepalive,

    /// Client disconnects from relay
    Disconnect,

    /// Relay error response
    Error {
        /// Error code
        code: RelayErrorCode,
        /// Human-readable error message
        message: String,
    },
}

/// Relay error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelayErrorCode {
    /// Client not registered with relay
    NotRegistered = 1,
    /// Destination peer not found
    PeerNotFound = 2,
    /// Invalid message format
    InvalidMessage = 3,
    /// Server at capacity
    ServerFull = 4,
    /// Internal server error
    InternalError = 5,
}

impl RelayMessage {
    /// Serialize message to bytes
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if bincode fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RelayError> {
        bincode::serialize(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Deserialize message from bytes
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Deserialization`] for anything that is not a
    /// relay message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        bincode::deserialize(bytes).map_err(|e| RelayError::Deserialization(e.to_string()))
    }

    /// Get the message type name
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            RelayMessage::Register { .. } => "Register",
            RelayMessage::RegisterAck { .. } => "RegisterAck",
            RelayMessage::SendPacket { .. } => "SendPacket",
            RelayMessage::RecvPacket { .. } => "RecvPacket",
            RelayMessage::Ping { .. } => "Ping",
            RelayMessage::Pong { .. } => "Pong",
            RelayMessage::Keepalive => "Keepalive",
            RelayMessage::Disconnect => "Disconnect",
            RelayMessage::Error { .. } => "Error",
        }
    }
}

/// Relay errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(String),
    /// Relay host could not be resolved
    #[error("cannot resolve relay {0}")]
    Resolve(String),
    /// No answer within the allotted time
    #[error("relay timeout")]
    Timeout,
    /// Client not registered
    #[error("client not registered")]
    NotRegistered,
    /// Peer not found
    #[error("peer not found")]
    PeerNotFound,
    /// Invalid message
    #[error("invalid relay message")]
    InvalidMessage,
    /// Server full
    #[error("relay server at capacity")]
    ServerFull,
    /// Registration refused
    #[error("registration rejected: {0}")]
    Rejected(String),
    /// Session was closed locally
    #[error("relay session closed")]
    Closed,
    /// Relay map has no regions to probe
    #[error("relay map is empty")]
    NoRegions,
    /// Internal error
    #[error("internal relay error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err.to_string())
    }
}

impl From<RelayErrorCode> for RelayError {
    fn from(code: RelayErrorCode) -> Self {
        match code {
            RelayErrorCode::NotRegistered => RelayError::NotRegistered,
            RelayErrorCode::PeerNotFound => RelayError::PeerNotFound,
            RelayErrorCode::InvalidMessage => RelayError::InvalidMessage,
            RelayErrorCode::ServerFull => RelayError::ServerFull,
            RelayErrorCode::InternalError => RelayError::Internal("unknown error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_send_packet() {
        let msg = RelayMessage::SendPacket {
            dest_id: [4u8; 32],
            payload: vec![1, 2, 3, 4, 5],
        };

        let bytes = msg.to_bytes().unwrap();
        let decoded = RelayMessage::from_bytes(&bytes).unwrap();

        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_message_serialization_error() {
        let msg = RelayMessage::Error {
            code: RelayErrorCode::PeerNotFound,
            message: "Peer not found".to_string(),
        };

        let decoded = RelayMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_garbage_is_not_a_message() {
        let result = RelayMessage::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(result, Err(RelayError::Deserialization(_))));
    }

    #[test]
    fn test_message_type_names() {
        assert_eq!(RelayMessage::Ping { nonce: 1 }.message_type(), "Ping");
        assert_eq!(RelayMessage::Keepalive.message_type(), "Keepalive");
        assert_eq!(
            RelayMessage::Register { node_id: [0u8; 32] }.message_type(),
            "Register"
        );
    }

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(
            RelayError::from(RelayErrorCode::NotRegistered),
            RelayError::NotRegistered
        );
        assert_eq!(
            RelayError::from(RelayErrorCode::ServerFull),
            RelayError::ServerFull
        );
        assert!(matches!(
            RelayError::from(RelayErrorCode::InternalError),
            RelayError::Internal(_)
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: RelayError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}

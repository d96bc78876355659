//! Overlay message codec.
//!
//! On the wire a message is a JSON object, sealed before it leaves the host:
//!
//! ```json
//! { "typ": 5, "node": { "key": "…" }, "host_info": { "username": "", "hostname": "" } }
//! ```
//!
//! `typ` is the compatibility contract: 1=ping, 2=pong, 3=hello,
//! 4=hello-response, 5=node-update. Unknown fields are ignored and missing
//! ones take their defaults.

use crate::error::{OverlayError, Result};
use crate::node::Node;
use serde::{Deserialize, Serialize};

/// Numeric message type carried in `typ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageType {
    /// Liveness probe
    Ping = 1,
    /// Answer to `Ping`
    Pong = 2,
    /// Connection request carrying host metadata
    Hello = 3,
    /// Answer to `Hello` carrying the local node
    HelloResponse = 4,
    /// Node descriptor advertisement
    NodeUpdate = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ping),
            2 => Ok(Self::Pong),
            3 => Ok(Self::Hello),
            4 => Ok(Self::HelloResponse),
            5 => Ok(Self::NodeUpdate),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

/// Metadata a `hello` sender declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Login name, may be empty
    #[serde(default)]
    pub username: String,
    /// Host name, may be empty
    #[serde(default)]
    pub hostname: String,
}

impl HostInfo {
    /// `user@host` with empty parts rendered as "unknown".
    #[must_use]
    pub fn display_name(&self) -> String {
        fn or_unknown(s: &str) -> &str {
            if s.is_empty() { "unknown" } else { s }
        }
        format!("{}@{}", or_unknown(&self.username), or_unknown(&self.hostname))
    }
}

/// Field-level wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireMessage {
    typ: MessageType,
    #[serde(default)]
    node: Node,
    #[serde(default)]
    host_info: HostInfo,
}

/// A decoded overlay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayMessage {
    /// Liveness probe, answered with `Pong`
    Ping,
    /// Terminal acknowledgement
    Pong,
    /// Connection request
    Hello(HostInfo),
    /// Answer to `Hello`
    HelloResponse(Node),
    /// Node advertisement; answered with the local node
    NodeUpdate(Node),
}

impl OverlayMessage {
    /// Wire type of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            OverlayMessage::Ping => MessageType::Ping,
            OverlayMessage::Pong => MessageType::Pong,
            OverlayMessage::Hello(_) => MessageType::Hello,
            OverlayMessage::HelloResponse(_) => MessageType::HelloResponse,
            OverlayMessage::NodeUpdate(_) => MessageType::NodeUpdate,
        }
    }

    /// Node carried by this message, if its type has one.
    #[must_use]
    pub fn node(&self) -> Option<&Node> {
        match self {
            OverlayMessage::HelloResponse(node) | OverlayMessage::NodeUpdate(node) => Some(node),
            _ => None,
        }
    }

    /// Encode to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::ProtocolViolation`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (node, host_info) = match self {
            OverlayMessage::Ping | OverlayMessage::Pong => (Node::default(), HostInfo::default()),
            OverlayMessage::Hello(info) => (Node::default(), info.clone()),
            OverlayMessage::HelloResponse(node) | OverlayMessage::NodeUpdate(node) => {
                (node.clone(), HostInfo::default())
            }
        };
        let wire = WireMessage {
            typ: self.message_type(),
            node,
            host_info,
        };
        serde_json::to_vec(&wire).map_err(|e| OverlayError::ProtocolViolation(e.to_string()))
    }

    /// Decode from JSON bytes.
    ///
    /// Also returns the node key carried in the message, which is the zero
    /// key for types without a node unless the sender filled it in anyway.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::ProtocolViolation`] for malformed JSON or an
    /// unknown `typ`.
    pub fn decode(bytes: &[u8]) -> Result<(Self, overlay_crypto::PublicKey)> {
        let wire: WireMessage = serde_json::from_slice(bytes)
            .map_err(|e| OverlayError::ProtocolViolation(e.to_string()))?;
        let sender = wire.node.key;

        let message = match wire.typ {
            MessageType::Ping => OverlayMessage::Ping,
            MessageType::Pong => OverlayMessage::Pong,
            MessageType::Hello => OverlayMessage::Hello(wire.host_info),
            MessageType::HelloResponse => OverlayMessage::HelloResponse(wire.node),
            MessageType::NodeUpdate => OverlayMessage::NodeUpdate(wire.node),
        };
        Ok((message, sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_crypto::PublicKey;

    #[test]
    fn test_type_is_an_integer() {
        let json = String::from_utf8(OverlayMessage::Ping.encode().unwrap()).unwrap();
        assert!(json.contains("\"typ\":1"), "{json}");

        let json = String::from_utf8(OverlayMessage::NodeUpdate(Node::default()).encode().unwrap())
            .unwrap();
        assert!(json.contains("\"typ\":5"), "{json}");
    }

    #[test]
    fn test_decode_minimal() {
        let (msg, sender) = OverlayMessage::decode(br#"{"typ":2}"#).unwrap();
        assert_eq!(msg, OverlayMessage::Pong);
        assert!(sender.is_zero());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let (msg, _) =
            OverlayMessage::decode(br#"{"typ":3,"host_info":{"username":"alice"},"extra":true}"#)
                .unwrap();
        assert_eq!(
            msg,
            OverlayMessage::Hello(HostInfo {
                username: "alice".to_string(),
                hostname: String::new(),
            })
        );
    }

    #[test]
    fn test_sender_comes_from_node_key() {
        let key = PublicKey::from_bytes([7; 32]);
        let bytes = OverlayMessage::NodeUpdate(Node::with_key(key)).encode().unwrap();
        let (_, sender) = OverlayMessage::decode(&bytes).unwrap();
        assert_eq!(sender, key);
    }

    #[test]
    fn test_unknown_type_is_a_violation() {
        assert!(matches!(
            OverlayMessage::decode(br#"{"typ":9}"#),
            Err(OverlayError::ProtocolViolation(_))
        ));
        assert!(matches!(
            OverlayMessage::decode(b"not json"),
            Err(OverlayError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_display_name_defaults() {
        assert_eq!(HostInfo::default().display_name(), "unknown@unknown");
        let info = HostInfo {
            username: "alice".to_string(),
            hostname: "box".to_string(),
        };
        assert_eq!(info.display_name(), "alice@box");
    }

    #[test]
    fn test_node_accessor() {
        assert!(OverlayMessage::Ping.node().is_none());
        let node = Node::with_key(PublicKey::from_bytes([1; 32]));
        assert_eq!(
            OverlayMessage::HelloResponse(node.clone()).node(),
            Some(&node)
        );
    }
}

//! Transport-agnostic message handling.
//!
//! Both channels hand every sealed datagram to [`MessageHandler::handle`] and
//! act only on what it returns: an optional sealed reply and the identity to
//! file the source address under.

use crate::error::{OverlayError, Result};
use crate::human::HumanLog;
use crate::message::OverlayMessage;
use crate::node::Node;
use crate::state::LastNode;
use overlay_crypto::{PublicKey, SessionSealer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which transport a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Direct UDP on the STUN socket
    Stun,
    /// Relay session
    Relay,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stun => f.write_str("STUN"),
            Transport::Relay => f.write_str("relay"),
        }
    }
}

/// Outcome of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    /// Sealed reply to send back to the source, if any
    pub reply: Option<Vec<u8>>,
    /// Node key carried by the message
    pub sender: PublicKey,
}

/// Opens, interprets and answers overlay messages.
#[derive(Clone)]
pub struct MessageHandler {
    sealer: Arc<SessionSealer>,
    last_node: Arc<LastNode>,
    inbound: mpsc::Sender<Node>,
    human: Arc<dyn HumanLog>,
}

impl MessageHandler {
    /// Create a handler over the session's shared state.
    #[must_use]
    pub fn new(
        sealer: Arc<SessionSealer>,
        last_node: Arc<LastNode>,
        inbound: mpsc::Sender<Node>,
        human: Arc<dyn HumanLog>,
    ) -> Self {
        Self {
            sealer,
            last_node,
            inbound,
            human,
        }
    }

    /// Handle one sealed message received over `transport`.
    ///
    /// # Errors
    ///
    /// - [`OverlayError::Crypto`] if the message does not open under this
    ///   session. Nothing changes; drop the message and carry on.
    /// - [`OverlayError::ProtocolViolation`] if it opens but is not an overlay
    ///   message. The channel should stop.
    pub async fn handle(&self, sealed: &[u8], transport: Transport) -> Result<Handled> {
        let cleartext = self.sealer.open(sealed)?;
        let (message, sender) = OverlayMessage::decode(&cleartext)?;

        let reply = match message {
            OverlayMessage::Ping => Some(OverlayMessage::Pong),
            OverlayMessage::Pong => None,
            OverlayMessage::Hello(info) => {
                self.human.info(&format!(
                    "Received connection request over {transport} from {}",
                    info.display_name()
                ));
                Some(OverlayMessage::HelloResponse(self.last_node.load_or_default()))
            }
            OverlayMessage::NodeUpdate(node) => {
                tracing::debug!(node_key = %node.key, %transport, "Received updated node");
                if self.inbound.send(node).await.is_err() {
                    tracing::warn!("Inbound node channel closed, dropping update");
                }
                Some(OverlayMessage::NodeUpdate(self.last_node.load_or_default()))
            }
            OverlayMessage::HelloResponse(_) => None,
        };

        let reply = match reply {
            Some(message) => Some(self.seal(&message)?),
            None => None,
        };
        Ok(Handled { reply, sender })
    }

    /// Encode and seal `message` for the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or sealing fails.
    pub fn seal(&self, message: &OverlayMessage) -> Result<Vec<u8>> {
        Ok(self.sealer.seal(&message.encode()?)?)
    }

    /// Publish `node` as the local node and seal a `node-update` for it.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or sealing fails.
    pub fn publish(&self, node: Node) -> Result<Vec<u8>> {
        let node = Arc::new(node);
        self.last_node.publish(Arc::clone(&node));
        self.seal(&OverlayMessage::NodeUpdate((*node).clone()))
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler").finish_non_exhaustive()
    }
}

/// Log a failed message and decide whether the channel goes on.
pub(crate) fn report_failure(
    human: &dyn HumanLog,
    err: &OverlayError,
    transport: Transport,
    from: &dyn fmt::Display,
) -> bool {
    if err.is_message_local() {
        human.warn(&format!(
            "Failed to handle overlay message over {transport} from {from}: {err}"
        ));
        true
    } else {
        tracing::error!(%transport, %from, "Overlay channel stopping: {err}");
        false
    }
}

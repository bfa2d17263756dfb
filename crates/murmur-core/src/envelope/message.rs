//! Decoded inbound messages

use chrono::{DateTime, Utc};

use crate::channel::Topic;
use crate::identity::PublicKey;

/// How a message reached us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Decrypted with the key of a joined channel
    Channel {
        /// Channel name
        name: String,
    },
    /// Decrypted with our private key
    Direct,
}

/// A message that passed validation and decryption.
///
/// Handed to the UI collaborator and then dropped; nothing is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Verified signer, absent for unsigned payloads
    pub sender_public_key: Option<PublicKey>,
    /// Channel or direct delivery
    pub delivery: Delivery,
    /// Topic the envelope arrived on
    pub topic: Topic,
    /// Decrypted body
    pub plaintext: Vec<u8>,
    /// Sender's envelope timestamp (unix seconds)
    pub sent_at: u64,
    /// Local receive time
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.plaintext).into_owned()
    }

    /// Channel name for channel deliveries
    pub fn channel_name(&self) -> Option<&str> {
        match &self.delivery {
            Delivery::Channel { name } => Some(name),
            Delivery::Direct => None,
        }
    }

    /// Whether this arrived as a private message
    pub fn is_direct(&self) -> bool {
        matches!(self.delivery, Delivery::Direct)
    }
}

//! Four-byte pub/sub topics

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Topic length in bytes
pub const TOPIC_LEN: usize = 4;

/// Well-known topic carrying every private message on the network
pub const DEFAULT_PRIVATE_TOPIC: Topic = Topic([0x11, 0x22, 0x33, 0x44]);

/// Short fixed-size filter value used by the transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(pub [u8; TOPIC_LEN]);

impl Topic {
    /// Create a topic from raw bytes
    pub const fn from_bytes(bytes: [u8; TOPIC_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, which must be exactly four bytes long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; TOPIC_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Raw topic bytes
    pub fn as_bytes(&self) -> &[u8; TOPIC_LEN] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self)
    }
}

impl FromStr for Topic {
    type Err = ChatError;

    /// Accepts `0x11223344` or `11223344`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != TOPIC_LEN * 2 {
            return Err(ChatError::Config(format!(
                "topic must be {} hex digits, got '{}'",
                TOPIC_LEN * 2,
                s
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| ChatError::Config(format!("invalid topic hex '{}': {}", s, e)))?;
        Topic::from_slice(&bytes)
            .ok_or_else(|| ChatError::Config(format!("invalid topic '{}'", s)))
    }
}

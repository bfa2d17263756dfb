//! Channel key store
//!
//! A channel is a named public broadcast context. Everyone who knows the
//! name derives the same symmetric key and topic locally, so joining a
//! channel needs no key exchange.
//!
//! ## Deterministic Key Derivation
//!
//! ```text
//! topic = BLAKE3("murmur-channel-topic-v1:" || name)[..4]
//! key   = BLAKE3("murmur-channel-key-v1:"   || name)
//! ```
//!
//! The two domain separators keep the key and topic independent, so the
//! public topic reveals nothing about the key.

mod store;
mod topic;

pub use store::ChannelKeyStore;
pub use topic::{Topic, DEFAULT_PRIVATE_TOPIC, TOPIC_LEN};

use std::fmt;

use crate::crypto::KEY_SIZE;

/// Prefix for channel topic derivation
const CHANNEL_TOPIC_PREFIX: &[u8] = b"murmur-channel-topic-v1:";

/// Prefix for channel key derivation
const CHANNEL_KEY_PREFIX: &[u8] = b"murmur-channel-key-v1:";

/// Symmetric key material for one channel.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey {
    name: String,
    topic: Topic,
    key: [u8; KEY_SIZE],
}

impl ChannelKey {
    /// Derive key and topic from the channel name.
    pub fn derive(name: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic_for(name),
            key: domain_hash(CHANNEL_KEY_PREFIX, name),
        }
    }

    /// Use externally provided key material.
    pub fn with_key(name: impl Into<String>, topic: Topic, key: [u8; KEY_SIZE]) -> Self {
        Self {
            name: name.into(),
            topic,
            key,
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pub/sub topic for this channel
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Symmetric key
    pub fn symmetric_key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelKey")
            .field("name", &self.name)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Derive the channel key for `name` (pure, idempotent).
pub fn derive_channel_key(name: &str) -> ChannelKey {
    ChannelKey::derive(name)
}

/// Topic a channel publishes on
pub fn topic_for(name: &str) -> Topic {
    let hash = domain_hash(CHANNEL_TOPIC_PREFIX, name);
    let mut topic = [0u8; TOPIC_LEN];
    topic.copy_from_slice(&hash[..TOPIC_LEN]);
    Topic(topic)
}

fn domain_hash(prefix: &[u8], name: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix);
    hasher.update(name.as_bytes());
    *hasher.finalize().as_bytes()
}

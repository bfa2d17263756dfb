//! Append-only store of joined channels

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{ChannelKey, Topic};

/// Channels joined during this session, in join order.
///
/// Read by the send path and the receive path concurrently. Entries are
/// only ever appended, and names are unique.
#[derive(Debug, Default)]
pub struct ChannelKeyStore {
    channels: RwLock<Vec<Arc<ChannelKey>>>,
}

impl ChannelKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a channel, deriving and storing it on first use.
    pub fn get_or_derive(&self, name: &str) -> Arc<ChannelKey> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut channels = self.channels.write();
        // Another writer may have raced us between the read and write lock
        if let Some(existing) = channels.iter().find(|c| c.name() == name) {
            return existing.clone();
        }

        let key = Arc::new(ChannelKey::derive(name));
        debug!(channel = %name, topic = %key.topic(), "Channel joined");
        channels.push(key.clone());
        key
    }

    /// Add externally provided key material.
    ///
    /// Returns `false` and keeps the existing entry if the name is taken.
    pub fn insert(&self, key: ChannelKey) -> bool {
        let mut channels = self.channels.write();
        if channels.iter().any(|c| c.name() == key.name()) {
            return false;
        }
        debug!(channel = %key.name(), topic = %key.topic(), "Channel key added");
        channels.push(Arc::new(key));
        true
    }

    /// Get a joined channel by name
    pub fn get(&self, name: &str) -> Option<Arc<ChannelKey>> {
        self.channels
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Snapshot of all channels in join order
    pub fn snapshot(&self) -> Vec<Arc<ChannelKey>> {
        self.channels.read().clone()
    }

    /// Distinct topics of all joined channels
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = Vec::new();
        for channel in self.channels.read().iter() {
            if !topics.contains(&channel.topic()) {
                topics.push(channel.topic());
            }
        }
        topics
    }

    /// Number of joined channels
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether no channel has been joined
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_derive_is_stable() {
        let store = ChannelKeyStore::new();
        let a = store.get_or_derive("default");
        let b = store.get_or_derive("default");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_join_order_preserved() {
        let store = ChannelKeyStore::new();
        store.get_or_derive("one");
        store.get_or_derive("two");
        store.get_or_derive("three");
        store.get_or_derive("two");

        let names: Vec<String> = store
            .snapshot()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_insert_rejects_duplicate_name() {
        let store = ChannelKeyStore::new();
        store.get_or_derive("default");

        let manual = ChannelKey::with_key("default", Topic([9, 9, 9, 9]), [1u8; 32]);
        assert!(!store.insert(manual));

        // Derived key survives
        let kept = store.get("default").unwrap();
        assert_eq!(kept.topic(), super::super::topic_for("default"));
    }

    #[test]
    fn test_topics_deduplicated() {
        let store = ChannelKeyStore::new();
        store.insert(ChannelKey::with_key("a", Topic([1, 1, 1, 1]), [1u8; 32]));
        store.insert(ChannelKey::with_key("b", Topic([1, 1, 1, 1]), [2u8; 32]));
        store.get_or_derive("c");

        assert_eq!(store.len(), 3);
        assert_eq!(store.topics().len(), 2);
    }

    #[test]
    fn test_get_unknown() {
        let store = ChannelKeyStore::new();
        assert!(store.is_empty());
        assert!(store.get("nope").is_none());
    }
}

//! In-process relay hub
//!
//! Every [`LocalTransport`] attached to the same [`LocalRelay`] sees the
//! envelopes the others publish, including its own, much like a gossip
//! swarm where the publisher is also subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{InboundEnvelope, InboundSender, Transport};
use crate::channel::Topic;
use crate::error::{ChatError, ChatResult};

#[derive(Debug, Default)]
struct RelayInner {
    subscribers: Mutex<HashMap<Topic, Vec<InboundSender>>>,
    unreachable: AtomicBool,
    published: AtomicUsize,
}

/// Shared in-memory pub/sub hub
#[derive(Debug, Clone, Default)]
pub struct LocalRelay {
    inner: Arc<RelayInner>,
}

impl LocalRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport handle attached to this relay
    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            relay: self.clone(),
        }
    }

    /// Simulate the relay going down or coming back
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Total envelopes published so far
    pub fn publish_count(&self) -> usize {
        self.inner.published.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(&topic)
            .map_or(0, |subs| subs.iter().filter(|s| !s.is_closed()).count())
    }

    fn is_reachable(&self) -> bool {
        !self.inner.unreachable.load(Ordering::SeqCst)
    }
}

/// Transport handle onto a [`LocalRelay`]
#[derive(Debug, Clone)]
pub struct LocalTransport {
    relay: LocalRelay,
}

impl LocalTransport {
    /// The relay this handle is attached to
    pub fn relay(&self) -> &LocalRelay {
        &self.relay
    }
}

impl Transport for LocalTransport {
    async fn is_reachable(&self) -> bool {
        self.relay.is_reachable()
    }

    async fn publish(
        &self,
        topic: Topic,
        envelope: Vec<u8>,
        ttl: u32,
        pow_target: f64,
    ) -> ChatResult<()> {
        if !self.relay.is_reachable() {
            return Err(ChatError::Network("Local relay unreachable".to_string()));
        }

        // Snapshot so the lock is not held across awaits
        let sinks: Vec<InboundSender> = {
            let mut subscribers = self.relay.inner.subscribers.lock();
            let sinks = subscribers
                .get_mut(&topic)
                .map(|sinks| {
                    sinks.retain(|s| !s.is_closed());
                    sinks.clone()
                })
                .unwrap_or_default();
            sinks
        };

        self.relay.inner.published.fetch_add(1, Ordering::SeqCst);
        debug!(%topic, len = envelope.len(), ttl, pow_target, subscribers = sinks.len(), "Relaying envelope");

        for sink in sinks {
            let delivery = InboundEnvelope {
                topic,
                bytes: envelope.clone(),
            };
            // Waits while the subscriber's queue is full
            if sink.send(delivery).await.is_err() {
                debug!(%topic, "Subscriber went away during relay");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: Topic, sink: InboundSender) -> ChatResult<()> {
        if !self.relay.is_reachable() {
            return Err(ChatError::Network("Local relay unreachable".to_string()));
        }
        self.relay
            .inner
            .subscribers
            .lock()
            .entry(topic)
            .or_default()
            .push(sink);
        debug!(%topic, "Subscribed on local relay");
        Ok(())
    }
}

//! Gossip transport using iroh-gossip
//!
//! Each four-byte envelope topic maps onto one gossip swarm:
//!
//! ```text
//! TopicId = BLAKE3("murmur-gossip-topic-v1:" || topic)
//! ```
//!
//! Subscribing joins the swarm and spawns a forwarding task that pushes
//! received envelope bytes into the router's inbound queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointId, SecretKey};
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use iroh_gossip::proto::TopicId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{InboundEnvelope, InboundSender, Transport};
use crate::channel::Topic;
use crate::envelope::MAX_ENVELOPE_SIZE;
use crate::error::{ChatError, ChatResult};

/// How long [`GossipTransport::is_reachable`] waits for a usable address
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(4);

const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Gossip frames carry one envelope plus protocol framing
const MAX_MESSAGE_SIZE: usize = 2 * MAX_ENVELOPE_SIZE;

/// Gossip swarm id for an envelope topic
pub fn gossip_topic_id(topic: Topic) -> TopicId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"murmur-gossip-topic-v1:");
    hasher.update(topic.as_bytes());
    TopicId::from_bytes(*hasher.finalize().as_bytes())
}

/// Relay network client over an iroh endpoint.
pub struct GossipTransport {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    bootstrap: Vec<EndpointId>,
    senders: parking_lot::Mutex<HashMap<Topic, Arc<Mutex<GossipSender>>>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl GossipTransport {
    /// Bind a fresh endpoint and spawn the gossip protocol.
    ///
    /// `bootstrap` peers are contacted when joining each topic swarm; the
    /// first node of a network passes an empty list.
    pub async fn bind(bootstrap: Vec<EndpointId>) -> ChatResult<Self> {
        // Transport identity is unrelated to the chat identity
        let secret_key = SecretKey::generate(&mut rand::rng());

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![GOSSIP_ALPN.to_vec()])
            .bind()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to bind endpoint: {}", e)))?;

        let endpoint_id = endpoint.id();
        info!(%endpoint_id, "Endpoint bound");

        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());
        info!(max_message_size = MAX_MESSAGE_SIZE, "Gossip spawned");

        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        Ok(Self {
            endpoint,
            gossip,
            router,
            bootstrap,
            senders: parking_lot::Mutex::new(HashMap::new()),
            tasks: parking_lot::Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// This node's endpoint id, shareable as a bootstrap peer
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Number of topic swarms joined
    pub fn topic_count(&self) -> usize {
        self.senders.lock().len()
    }

    /// Stop forwarding tasks and close the endpoint.
    pub async fn shutdown(&self) -> ChatResult<()> {
        info!("Shutting down gossip transport");
        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }
        self.endpoint.close().await;
        info!("Gossip transport shutdown complete");
        Ok(())
    }

    fn sender_for(&self, topic: Topic) -> Option<Arc<Mutex<GossipSender>>> {
        self.senders.lock().get(&topic).cloned()
    }
}

impl std::fmt::Debug for GossipTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipTransport")
            .field("endpoint_id", &self.endpoint.id())
            .field("bootstrap", &self.bootstrap)
            .field("topics", &self.topic_count())
            .finish_non_exhaustive()
    }
}

impl Transport for GossipTransport {
    async fn is_reachable(&self) -> bool {
        let deadline = Instant::now() + PROBE_TIMEOUT;
        loop {
            let addr = self.endpoint.addr();
            if !addr.addrs.is_empty() {
                debug!(addrs = addr.addrs.len(), "Endpoint has addresses");
                return true;
            }
            if Instant::now() >= deadline {
                warn!("Endpoint found no usable address");
                return false;
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn publish(
        &self,
        topic: Topic,
        envelope: Vec<u8>,
        ttl: u32,
        pow_target: f64,
    ) -> ChatResult<()> {
        let sender = self
            .sender_for(topic)
            .ok_or_else(|| ChatError::Gossip(format!("Not subscribed to topic {}", topic)))?;

        debug!(%topic, len = envelope.len(), ttl, pow_target, "Broadcasting envelope");
        let result = sender
            .lock()
            .await
            .broadcast(Bytes::from(envelope))
            .await
            .map_err(|e| ChatError::Gossip(format!("Failed to broadcast: {}", e)));
        result
    }

    async fn subscribe(&self, topic: Topic, sink: InboundSender) -> ChatResult<()> {
        if self.sender_for(topic).is_some() {
            debug!(%topic, "Already subscribed");
            return Ok(());
        }

        let topic_id = gossip_topic_id(topic);
        info!(%topic, ?topic_id, peer_count = self.bootstrap.len(), "Subscribing to topic");

        let gossip_topic = self
            .gossip
            .subscribe(topic_id, self.bootstrap.clone())
            .await
            .map_err(|e| ChatError::Gossip(format!("Failed to subscribe: {}", e)))?;
        let (sender, receiver) = gossip_topic.split();

        self.senders
            .lock()
            .insert(topic, Arc::new(Mutex::new(sender)));

        let task = tokio::spawn(forward(topic, receiver, sink, self.cancel.clone()));
        self.tasks.lock().push(task);
        Ok(())
    }
}

/// Forward received gossip messages into the inbound queue, in arrival order.
async fn forward(
    topic: Topic,
    mut receiver: GossipReceiver,
    sink: InboundSender,
    cancel: CancellationToken,
) {
    use n0_future::StreamExt;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.try_next() => event,
        };

        match event {
            Ok(Some(Event::Received(msg))) => {
                debug!(%topic, from = ?msg.delivered_from, len = msg.content.len(), "Received envelope");
                let inbound = InboundEnvelope {
                    topic,
                    bytes: msg.content.to_vec(),
                };
                // Waits while the router is behind
                if sink.send(inbound).await.is_err() {
                    debug!(%topic, "Inbound queue closed");
                    break;
                }
            }
            Ok(Some(Event::NeighborUp(peer))) => {
                info!(%topic, ?peer, "Neighbor joined");
            }
            Ok(Some(Event::NeighborDown(peer))) => {
                info!(%topic, ?peer, "Neighbor left");
            }
            Ok(Some(Event::Lagged)) => {
                warn!(%topic, "Lagged behind on topic");
            }
            Ok(None) => {
                debug!(%topic, "Topic subscription closed");
                break;
            }
            Err(e) => {
                warn!(%topic, error = ?e, "Error receiving from topic");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::inbound_queue;

    #[test]
    fn test_gossip_topic_id_is_deterministic() {
        let a = gossip_topic_id(Topic([1, 2, 3, 4]));
        let b = gossip_topic_id(Topic([1, 2, 3, 4]));
        let c = gossip_topic_id(Topic([1, 2, 3, 5]));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_gossip_transport_creates() {
        let transport = GossipTransport::bind(vec![])
            .await
            .expect("Failed to bind gossip transport");
        assert!(!transport.endpoint_id().to_string().is_empty());

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_then_publish_without_peers() {
        let transport = GossipTransport::bind(vec![]).await.unwrap();
        let topic = Topic([0xAB, 0xCD, 0xEF, 0x01]);
        let (tx, _rx) = inbound_queue(4);

        transport.subscribe(topic, tx.clone()).await.unwrap();
        // Second subscribe is a no-op
        transport.subscribe(topic, tx).await.unwrap();
        assert_eq!(transport.topic_count(), 1);

        // Broadcasting without peers succeeds; the message goes nowhere
        transport.publish(topic, vec![1, 2, 3], 20, 2.0).await.unwrap();

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_requires_subscription() {
        let transport = GossipTransport::bind(vec![]).await.unwrap();
        let result = transport.publish(Topic([9, 9, 9, 9]), vec![1], 20, 2.0).await;
        assert!(matches!(result, Err(ChatError::Gossip(_))));

        transport.shutdown().await.unwrap();
    }
}

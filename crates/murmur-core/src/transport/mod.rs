//! Transport adapters for the relay network
//!
//! The core only ever hands encoded envelope bytes to a transport and only
//! ever receives encoded envelope bytes back.
//!
//! ```text
//! ┌──────────────┐  publish(topic, bytes)  ┌────────────────────┐
//! │ MessageRouter│ ──────────────────────▶ │ Transport          │
//! │              │                         │ (LocalRelay/iroh)  │
//! │ inbound loop │ ◀── bounded mpsc ────── │ forwarding task(s) │
//! └──────────────┘   InboundEnvelope       └────────────────────┘
//! ```
//!
//! ## Backpressure
//!
//! The inbound queue is a bounded [`tokio::sync::mpsc`] channel. When it is
//! full, the transport's forwarding side waits (block-publisher). Nothing is
//! dropped inside the core; a relay that cannot keep up applies its own
//! flow control upstream.

mod gossip;
mod memory;

pub use gossip::{gossip_topic_id, GossipTransport, PROBE_TIMEOUT};
pub use memory::{LocalRelay, LocalTransport};

use std::future::Future;

use tokio::sync::mpsc;

use crate::channel::Topic;
use crate::error::ChatResult;

/// Default capacity of the inbound envelope queue
pub const INBOUND_QUEUE_CAPACITY: usize = 256;

/// Raw envelope bytes delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    /// Topic the envelope was received on
    pub topic: Topic,
    /// Encoded envelope
    pub bytes: Vec<u8>,
}

/// Producer half of the inbound queue, handed to transports
pub type InboundSender = mpsc::Sender<InboundEnvelope>;

/// Consumer half of the inbound queue, drained by the router
pub type InboundReceiver = mpsc::Receiver<InboundEnvelope>;

/// Create a bounded inbound queue.
pub fn inbound_queue(capacity: usize) -> (InboundSender, InboundReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Pub/sub relay network client.
///
/// Implementations forward every envelope received on a subscribed topic
/// into the sink passed to [`Transport::subscribe`], waiting while the sink
/// is full.
pub trait Transport: Send + Sync + 'static {
    /// Connectivity probe, used once at startup.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;

    /// Publish encoded envelope bytes on `topic`.
    fn publish(
        &self,
        topic: Topic,
        envelope: Vec<u8>,
        ttl: u32,
        pow_target: f64,
    ) -> impl Future<Output = ChatResult<()>> + Send;

    /// Start forwarding envelopes on `topic` into `sink`.
    fn subscribe(
        &self,
        topic: Topic,
        sink: InboundSender,
    ) -> impl Future<Output = ChatResult<()>> + Send;
}

//! Murmur Core Library
//!
//! Topic-addressed encrypted messaging over a gossip relay network.
//!
//! ## Overview
//!
//! Peers exchange public messages on named channels and private messages
//! addressed to a public key. There is no server: every message is an
//! encrypted, proof-of-work stamped, TTL-bounded [`Envelope`] published on a
//! four-byte topic, and every node decides locally whether an envelope is
//! valid and whether it holds a key that opens it.
//!
//! ```text
//! send:     cmd ─▶ Command ─▶ encode_* ─▶ PowSearch ─▶ Transport::publish
//! receive:  Transport ─▶ mpsc ─▶ validate ─▶ open ─▶ ChatUi::add_message
//! ```
//!
//! ## Core Principles
//!
//! - **No plaintext on the wire**: only envelopes cross the transport
//! - **Join by name**: channel keys and topics derive from the channel name
//! - **Total decoding**: hostile bytes are dropped, never raised
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use murmur_core::{ChatConfig, ChatNode, GossipTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = GossipTransport::bind(vec![]).await?;
//!     let node = ChatNode::start(ChatConfig::default(), transport, Arc::new(MyUi)).await?;
//!
//!     node.send("hello").await?;
//!     node.send(&format!("/msg {} psst", friend_key)).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod node;
pub mod pow;
pub mod router;
pub mod transport;
pub mod ui;

// Re-exports
pub use channel::{derive_channel_key, topic_for, ChannelKey, ChannelKeyStore, Topic};
pub use config::ChatConfig;
pub use crypto::ChannelCipher;
pub use envelope::{Decoded, Envelope, EnvelopeDraft, InboundMessage, InvalidReason};
pub use error::{ChatError, ChatResult};
pub use identity::{generate_identity, public_key_of, Identity, PublicKey};
pub use node::{ChatNode, STARTUP_TIMEOUT};
pub use pow::{PowSearch, PowStamp};
pub use router::{parse_command, Command, Disposition, MessageRouter, RouterStats, Session};
pub use transport::{GossipTransport, InboundEnvelope, LocalRelay, LocalTransport, Transport};
pub use ui::{ChatUi, SenderId};

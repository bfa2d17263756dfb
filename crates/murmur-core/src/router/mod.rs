//! Message router
//!
//! Maps user intents onto published envelopes and inbound envelopes onto
//! attributed messages for the UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  MessageRouter                                                  │
//! │  ├── session: identity + ChannelKeyStore + ChatConfig           │
//! │  ├── send path (sequential, one command at a time)              │
//! │  │   └── encode → PoW (blocking worker) → seen → publish → echo │
//! │  ├── inbound path (own task, arrival order)                     │
//! │  │   └── validate → seen? → open → remember → ui.add_message    │
//! │  └── counters: delivered / invalid / not_for_me / dup / sent    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-message failures on the send path are reported with
//! [`ChatUi::add_error`] and never end the session. Inbound envelopes that
//! are invalid or not for us are dropped and only counted.

mod command;
mod seen;

pub use command::{parse_command, Command, CommandError, PRIVATE_PREFIX};
pub use seen::{SeenCache, MAX_SEEN_ENVELOPES};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelKey, ChannelKeyStore, Topic};
use crate::config::ChatConfig;
use crate::envelope::{
    encode_private, encode_public, open as open_envelope, unix_now, validate as validate_envelope,
    DecodeOptions, Decoded, Delivery, Envelope, EnvelopeDraft, InboundMessage, InvalidReason,
};
use crate::error::{ChatError, ChatResult};
use crate::identity::{Identity, PublicKey};
use crate::pow::PowSearch;
use crate::transport::{InboundEnvelope, InboundReceiver, InboundSender, Transport};
use crate::ui::{ChatUi, SenderId};

/// How often the inbound loop forgets expired envelope hashes
const SEEN_PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Session context owned by the router.
///
/// The identity never changes after creation and the channel store is
/// append-only, so both paths read them without coordination.
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    channels: ChannelKeyStore,
    config: ChatConfig,
}

impl Session {
    /// Create a session with no channels joined yet
    pub fn new(identity: Identity, config: ChatConfig) -> Self {
        Self {
            identity,
            channels: ChannelKeyStore::new(),
            config,
        }
    }

    /// Our identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Joined channels
    pub fn channels(&self) -> &ChannelKeyStore {
        &self.channels
    }

    /// Session configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Channel that public messages go to
    pub fn active_channel(&self) -> &str {
        &self.config.channel_name
    }
}

/// Snapshot of router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages handed to the UI
    pub delivered: u64,
    /// Envelopes dropped as invalid
    pub invalid: u64,
    /// Envelopes for channels or recipients we hold no key for
    pub not_for_me: u64,
    /// Envelopes seen before (relay re-delivery or our own echo)
    pub duplicates: u64,
    /// Envelopes published
    pub sent: u64,
    /// Live envelope hashes forgotten because the seen cache was full
    pub seen_evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    invalid: AtomicU64,
    not_for_me: AtomicU64,
    duplicates: AtomicU64,
    sent: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RouterStats {
        RouterStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            not_for_me: self.not_for_me.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            seen_evictions: 0,
        }
    }
}

/// What happened to one inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Decoded and shown
    Delivered(InboundMessage),
    /// Already seen
    Duplicate,
    /// Not addressed to any key we hold
    NotForMe,
    /// Dropped
    Invalid(InvalidReason),
}

/// Routes messages between the UI, the codec and a transport.
pub struct MessageRouter<T: Transport> {
    session: Session,
    transport: Arc<T>,
    ui: Arc<dyn ChatUi>,
    inbound_tx: InboundSender,
    subscribed: parking_lot::Mutex<HashSet<Topic>>,
    seen: SeenCache,
    counters: Counters,
    cancel: CancellationToken,
}

impl<T: Transport> MessageRouter<T> {
    /// Create a router. Subscriptions forward into `inbound_tx`.
    pub fn new(
        session: Session,
        transport: Arc<T>,
        ui: Arc<dyn ChatUi>,
        inbound_tx: InboundSender,
    ) -> Self {
        Self {
            session,
            transport,
            ui,
            inbound_tx,
            subscribed: parking_lot::Mutex::new(HashSet::new()),
            seen: SeenCache::new(),
            counters: Counters::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Session context
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Our contact address
    pub fn public_key(&self) -> &PublicKey {
        self.session.identity.public_key()
    }

    /// The transport in use
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Counter snapshot
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            seen_evictions: self.seen.evicted(),
            ..self.counters.snapshot()
        }
    }

    /// Subscribe `topic` once; repeated calls are no-ops.
    pub async fn subscribe(&self, topic: Topic) -> ChatResult<()> {
        if !self.subscribed.lock().insert(topic) {
            return Ok(());
        }
        if let Err(e) = self.transport.subscribe(topic, self.inbound_tx.clone()).await {
            self.subscribed.lock().remove(&topic);
            return Err(e);
        }
        info!(%topic, "Subscribed");
        Ok(())
    }

    /// Derive (first use) and subscribe a channel by name.
    pub async fn join_channel(&self, name: &str) -> ChatResult<Arc<ChannelKey>> {
        if name.trim().is_empty() {
            return Err(ChatError::UnknownChannel(
                "channel name must not be empty".to_string(),
            ));
        }
        let key = self.session.channels.get_or_derive(name);
        self.subscribe(key.topic()).await?;
        Ok(key)
    }

    /// Parse and execute one line of user input.
    ///
    /// Failures are reported to the UI as well as returned.
    pub async fn handle_command(&self, input: &str) -> ChatResult<()> {
        if input.trim().is_empty() {
            return Ok(());
        }

        let result = match parse_command(input) {
            Command::Public { body } => {
                self.send_public(self.session.active_channel(), body.as_bytes())
                    .await
            }
            Command::Private { recipient, body } => {
                self.send_private(&recipient, body.as_bytes()).await
            }
            Command::Invalid(err) => Err(err.into()),
        };

        if let Err(err) = &result {
            warn!(error = %err, "Send failed");
            self.ui.add_error(&format!("Couldn't send message: {}", err));
        }
        result
    }

    /// Broadcast `plaintext` on a channel, deriving it on first use.
    pub async fn send_public(&self, channel_name: &str, plaintext: &[u8]) -> ChatResult<()> {
        let channel = self.join_channel(channel_name).await?;
        let draft = encode_public(
            plaintext,
            &channel,
            self.session.config.ttl,
            Some(&self.session.identity),
        )?;
        self.stamp_and_publish(draft).await?;

        let sender = SenderId::Channel {
            name: channel.name().to_string(),
            signer: Some(*self.public_key()),
        };
        self.ui
            .add_message(&sender, &String::from_utf8_lossy(plaintext));
        Ok(())
    }

    /// Send `plaintext` that only `recipient` can read.
    pub async fn send_private(&self, recipient: &PublicKey, plaintext: &[u8]) -> ChatResult<()> {
        let draft = encode_private(
            plaintext,
            recipient,
            self.session.config.ttl,
            self.session.config.topic,
            Some(&self.session.identity),
        )?;
        self.stamp_and_publish(draft).await?;

        // We cannot decrypt our own private envelope, so echo it locally
        self.ui.add_message(
            &SenderId::Peer(*self.public_key()),
            &String::from_utf8_lossy(plaintext),
        );
        Ok(())
    }

    async fn stamp_and_publish(&self, mut draft: EnvelopeDraft) -> ChatResult<()> {
        let config = &self.session.config;
        draft.pow_target = config.pow_target;

        let search = PowSearch::new(config.pow_target, config.pow_time)
            .cancel_token(self.cancel.child_token());
        let (draft, stamp) = search.run_blocking(draft).await?;

        if !stamp.met_target {
            if stamp.work < config.min_pow {
                return Err(ChatError::InsufficientWork {
                    achieved: stamp.work,
                    required: config.min_pow,
                });
            }
            warn!(
                work = stamp.work,
                target = config.pow_target,
                min_pow = config.min_pow,
                "Proof-of-work below target, sending best effort"
            );
        }

        let envelope = draft.seal(&stamp);
        let bytes = envelope.to_bytes()?;
        self.seen
            .insert(Envelope::hash_bytes(&bytes), envelope.expiry(), unix_now());

        debug!(
            topic = %envelope.topic,
            len = bytes.len(),
            ttl = envelope.ttl,
            work = stamp.work,
            "Publishing envelope"
        );
        self.transport
            .publish(envelope.topic, bytes, envelope.ttl, envelope.pow_target)
            .await?;
        Counters::bump(&self.counters.sent);
        Ok(())
    }

    /// Decode one inbound envelope against the current clock.
    pub fn on_inbound_envelope(&self, inbound: InboundEnvelope) -> Disposition {
        self.on_inbound_envelope_at(inbound, DecodeOptions::new(self.session.config.min_pow))
    }

    /// Decode one inbound envelope with explicit validation options.
    pub fn on_inbound_envelope_at(
        &self,
        inbound: InboundEnvelope,
        options: DecodeOptions,
    ) -> Disposition {
        let envelope = match validate_envelope(&inbound.bytes, &options) {
            Ok(envelope) => envelope,
            Err(reason) => {
                debug!(topic = %inbound.topic, %reason, "Dropping invalid envelope");
                Counters::bump(&self.counters.invalid);
                return Disposition::Invalid(reason);
            }
        };

        let hash = Envelope::hash_bytes(&inbound.bytes);
        if self.seen.contains(&hash, options.now) {
            debug!(topic = %inbound.topic, "Dropping duplicate envelope");
            Counters::bump(&self.counters.duplicates);
            return Disposition::Duplicate;
        }

        // NotForMe is not remembered: a channel joined later can still
        // read a re-delivered copy
        let channels = self.session.channels.snapshot();
        let decoded = open_envelope(&envelope, &channels, &self.session.identity);
        if !matches!(decoded, Decoded::NotForMe) {
            self.seen.insert(hash, envelope.expiry(), options.now);
        }

        match decoded {
            Decoded::Message(message) => {
                let sender = attribute(&message);
                debug!(topic = %message.topic, %sender, "Delivering message");
                self.ui.add_message(&sender, &message.text());
                Counters::bump(&self.counters.delivered);
                Disposition::Delivered(message)
            }
            Decoded::NotForMe => {
                Counters::bump(&self.counters.not_for_me);
                Disposition::NotForMe
            }
            Decoded::Invalid(reason) => {
                debug!(topic = %inbound.topic, %reason, "Dropping invalid payload");
                Counters::bump(&self.counters.invalid);
                Disposition::Invalid(reason)
            }
        }
    }

    /// Drain the inbound queue until it closes or the router shuts down.
    pub async fn run_inbound(self: Arc<Self>, mut inbound: InboundReceiver) {
        let mut prune = tokio::time::interval(SEEN_PRUNE_INTERVAL);
        prune.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = prune.tick() => self.seen.prune(unix_now()),
                next = inbound.recv() => match next {
                    Some(envelope) => {
                        self.on_inbound_envelope(envelope);
                    }
                    None => break,
                },
            }
        }
        debug!(stats = ?self.stats(), "Inbound loop stopped");
    }

    /// Cancel any running proof-of-work search and stop the inbound loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl<T: Transport> std::fmt::Debug for MessageRouter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("public_key", self.public_key())
            .field("channels", &self.session.channels.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Who the UI should show as the sender
fn attribute(message: &InboundMessage) -> SenderId {
    match (&message.delivery, message.sender_public_key) {
        (Delivery::Channel { name }, signer) => SenderId::Channel {
            name: name.clone(),
            signer,
        },
        (Delivery::Direct, Some(key)) => SenderId::Peer(key),
        (Delivery::Direct, None) => SenderId::Anonymous,
    }
}

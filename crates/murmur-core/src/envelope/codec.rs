//! Envelope construction and total decoding
//!
//! Inbound checks run cheapest first:
//!
//! 1. size limit, wire parse and minimum ciphertext length
//! 2. version, TTL range, expiry and clock skew
//! 3. proof-of-work against the receiver's minimum
//! 4. symmetric decryption with each joined channel, in join order
//! 5. asymmetric decryption with our identity
//!
//! Failing 1-3 is `Invalid`; failing every key in 4-5 is `NotForMe`.
//! Decoding never panics and never returns an error: attacker-controlled
//! bytes only ever produce one of the three [`Decoded`] outcomes.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::payload::{self, PayloadError, SignedContext, PADDING_BLOCK};
use super::{
    unix_now, Delivery, Envelope, EnvelopeDraft, InboundMessage, CLOCK_SKEW_ALLOWANCE,
    ENVELOPE_VERSION, MAX_ENVELOPE_SIZE, MAX_TTL,
};
use crate::channel::{ChannelKey, Topic};
use crate::crypto::{ChannelCipher, NONCE_SIZE, TAG_SIZE};
use crate::error::{ChatError, ChatResult};
use crate::identity::{open_with, seal_for, Identity, PublicKey};
use crate::pow;

/// Room left for envelope framing when checking ciphertext size
const FRAMING_ALLOWANCE: usize = 64;

/// Shortest ciphertext either encoder produces: one padding block under
/// the channel cipher. Sealed private messages are longer still.
pub const MIN_CIPHERTEXT_LEN: usize = PADDING_BLOCK + NONCE_SIZE + TAG_SIZE;

/// Outcome of decoding an inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Validated and decrypted
    Message(InboundMessage),
    /// Valid, but for a channel or recipient we hold no key for
    NotForMe,
    /// Malformed, expired, or spam; dropped silently
    Invalid(InvalidReason),
}

/// Why an envelope was classified `Invalid`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidReason {
    /// Exceeds the size limit
    TooLarge(usize),
    /// Could not be parsed from the wire
    Malformed,
    /// Unknown protocol version
    UnsupportedVersion(u8),
    /// Ciphertext shorter than [`MIN_CIPHERTEXT_LEN`]
    Truncated(usize),
    /// TTL of zero
    ZeroTtl,
    /// TTL above [`MAX_TTL`]
    TtlTooLong(u32),
    /// TTL elapsed
    Expired,
    /// Timestamp too far in the future
    FromFuture,
    /// Work below the receiver's minimum
    InsufficientWork(f64),
    /// Decrypted, but the inner payload is corrupt
    BadPayload,
    /// Decrypted, but the sender signature does not verify
    BadSignature,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::TooLarge(size) => write!(f, "too large ({} bytes)", size),
            InvalidReason::Malformed => write!(f, "malformed"),
            InvalidReason::UnsupportedVersion(v) => write!(f, "unsupported version {}", v),
            InvalidReason::Truncated(len) => write!(f, "truncated ciphertext ({} bytes)", len),
            InvalidReason::ZeroTtl => write!(f, "zero ttl"),
            InvalidReason::TtlTooLong(ttl) => write!(f, "ttl too long ({}s)", ttl),
            InvalidReason::Expired => write!(f, "expired"),
            InvalidReason::FromFuture => write!(f, "timestamp in the future"),
            InvalidReason::InsufficientWork(work) => write!(f, "insufficient work ({:.4})", work),
            InvalidReason::BadPayload => write!(f, "bad payload"),
            InvalidReason::BadSignature => write!(f, "bad signature"),
        }
    }
}

impl From<PayloadError> for InvalidReason {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Malformed => InvalidReason::BadPayload,
            PayloadError::BadSignature => InvalidReason::BadSignature,
        }
    }
}

/// Receiver-side validation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Minimum acceptable work
    pub min_pow: f64,
    /// Current unix time in seconds
    pub now: u64,
}

impl DecodeOptions {
    /// Validate against the current clock
    pub fn new(min_pow: f64) -> Self {
        Self {
            min_pow,
            now: unix_now(),
        }
    }

    /// Validate as of a fixed time
    pub fn at(self, now: u64) -> Self {
        Self { now, ..self }
    }
}

/// Encrypt a public message under a channel key.
///
/// The payload is signed with `signer` when given, so receivers can
/// attribute the message to a public key.
pub fn encode_public(
    plaintext: &[u8],
    channel: &ChannelKey,
    ttl: u32,
    signer: Option<&Identity>,
) -> ChatResult<EnvelopeDraft> {
    check_ttl(ttl)?;
    let context = SignedContext {
        topic: channel.topic(),
        timestamp: unix_now(),
        ttl,
        recipient: None,
    };
    let padded = payload::build(plaintext, &context, signer)?;
    check_size(padded.len())?;

    let ciphertext = ChannelCipher::new(channel.symmetric_key()).encrypt(&padded)?;
    Ok(new_draft(&context, ciphertext))
}

/// Encrypt a private message so only `recipient` can read it.
///
/// `topic` is the network-wide private-message topic.
pub fn encode_private(
    plaintext: &[u8],
    recipient: &PublicKey,
    ttl: u32,
    topic: Topic,
    signer: Option<&Identity>,
) -> ChatResult<EnvelopeDraft> {
    check_ttl(ttl)?;
    let context = SignedContext {
        topic,
        timestamp: unix_now(),
        ttl,
        recipient: Some(recipient),
    };
    let padded = payload::build(plaintext, &context, signer)?;
    check_size(padded.len())?;

    let ciphertext = seal_for(recipient, &padded)?;
    Ok(new_draft(&context, ciphertext))
}

/// Decode inbound bytes against the current clock.
pub fn decode(
    bytes: &[u8],
    channels: &[Arc<ChannelKey>],
    identity: &Identity,
    min_pow: f64,
) -> Decoded {
    decode_at(bytes, channels, identity, &DecodeOptions::new(min_pow))
}

/// Decode inbound bytes with explicit validation options.
pub fn decode_at(
    bytes: &[u8],
    channels: &[Arc<ChannelKey>],
    identity: &Identity,
    options: &DecodeOptions,
) -> Decoded {
    match validate(bytes, options) {
        Ok(envelope) => open(&envelope, channels, identity),
        Err(reason) => Decoded::Invalid(reason),
    }
}

/// Parse and check everything that needs no key material.
pub fn validate(bytes: &[u8], options: &DecodeOptions) -> Result<Envelope, InvalidReason> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(InvalidReason::TooLarge(bytes.len()));
    }
    let envelope = Envelope::from_bytes(bytes).map_err(|_| InvalidReason::Malformed)?;

    if envelope.version != ENVELOPE_VERSION {
        return Err(InvalidReason::UnsupportedVersion(envelope.version));
    }
    if envelope.ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(InvalidReason::Truncated(envelope.ciphertext.len()));
    }
    if envelope.ttl == 0 {
        return Err(InvalidReason::ZeroTtl);
    }
    if envelope.ttl > MAX_TTL {
        return Err(InvalidReason::TtlTooLong(envelope.ttl));
    }
    if envelope.timestamp > options.now.saturating_add(CLOCK_SKEW_ALLOWANCE) {
        return Err(InvalidReason::FromFuture);
    }
    if options.now > envelope.expiry() {
        return Err(InvalidReason::Expired);
    }

    let work = pow::verify(&envelope);
    if !(work >= options.min_pow) {
        return Err(InvalidReason::InsufficientWork(work));
    }

    Ok(envelope)
}

/// Try every key we hold against an already validated envelope.
pub fn open(envelope: &Envelope, channels: &[Arc<ChannelKey>], identity: &Identity) -> Decoded {
    for channel in channels {
        let cipher = ChannelCipher::new(channel.symmetric_key());
        if let Ok(plaintext) = cipher.decrypt(&envelope.ciphertext) {
            let delivery = Delivery::Channel {
                name: channel.name().to_string(),
            };
            return finish(envelope, &plaintext, delivery, None);
        }
    }

    match open_with(identity, &envelope.ciphertext) {
        Ok(plaintext) => finish(
            envelope,
            &plaintext,
            Delivery::Direct,
            Some(identity.public_key()),
        ),
        Err(_) => Decoded::NotForMe,
    }
}

fn finish(
    envelope: &Envelope,
    plaintext: &[u8],
    delivery: Delivery,
    recipient: Option<&PublicKey>,
) -> Decoded {
    let context = SignedContext {
        topic: envelope.topic,
        timestamp: envelope.timestamp,
        ttl: envelope.ttl,
        recipient,
    };
    match payload::open(plaintext, &context) {
        Ok(opened) => Decoded::Message(InboundMessage {
            sender_public_key: opened.signer,
            delivery,
            topic: envelope.topic,
            plaintext: opened.body,
            sent_at: envelope.timestamp,
            received_at: Utc::now(),
        }),
        Err(err) => Decoded::Invalid(err.into()),
    }
}

fn new_draft(context: &SignedContext<'_>, ciphertext: Vec<u8>) -> EnvelopeDraft {
    EnvelopeDraft {
        topic: context.topic,
        timestamp: context.timestamp,
        ttl: context.ttl,
        pow_target: 0.0,
        ciphertext,
    }
}

fn check_ttl(ttl: u32) -> ChatResult<()> {
    if ttl == 0 || ttl > MAX_TTL {
        return Err(ChatError::InvalidTtl(ttl));
    }
    Ok(())
}

fn check_size(padded_len: usize) -> ChatResult<()> {
    let max = MAX_ENVELOPE_SIZE - FRAMING_ALLOWANCE - crate::identity::SEALED_OVERHEAD;
    if padded_len > max {
        return Err(ChatError::PayloadTooLarge {
            size: padded_len,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{derive_channel_key, DEFAULT_PRIVATE_TOPIC};
    use crate::pow::PowSearch;
    use std::time::Duration;

    const MIN_POW: f64 = 0.01;

    fn stamp(mut draft: EnvelopeDraft) -> Vec<u8> {
        draft.pow_target = 0.05;
        let stamp = PowSearch::new(0.05, Duration::from_secs(10)).run(&draft);
        assert!(stamp.met_target);
        draft.seal(&stamp).to_bytes().unwrap()
    }

    fn options() -> DecodeOptions {
        DecodeOptions::new(MIN_POW)
    }

    #[test]
    fn test_public_roundtrip() {
        let channel = Arc::new(derive_channel_key("default"));
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();

        let bytes = stamp(encode_public(b"hello", &channel, 20, Some(&alice)).unwrap());

        match decode_at(&bytes, &[channel], &bob, &options()) {
            Decoded::Message(msg) => {
                assert_eq!(msg.plaintext, b"hello");
                assert_eq!(msg.channel_name(), Some("default"));
                assert_eq!(msg.sender_public_key.as_ref(), Some(alice.public_key()));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_unsigned_public_has_no_sender() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();

        let bytes = stamp(encode_public(b"anon", &channel, 20, None).unwrap());
        match decode_at(&bytes, &[channel], &bob, &options()) {
            Decoded::Message(msg) => assert_eq!(msg.sender_public_key, None),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_private_roundtrip_and_not_for_me() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let carol = Identity::generate().unwrap();

        let bytes = stamp(
            encode_private(b"secret", bob.public_key(), 20, DEFAULT_PRIVATE_TOPIC, Some(&alice))
                .unwrap(),
        );

        match decode_at(&bytes, &[], &bob, &options()) {
            Decoded::Message(msg) => {
                assert_eq!(msg.plaintext, b"secret");
                assert!(msg.is_direct());
                assert_eq!(msg.sender_public_key.as_ref(), Some(alice.public_key()));
            }
            other => panic!("expected message, got {:?}", other),
        }
        assert_eq!(decode_at(&bytes, &[], &carol, &options()), Decoded::NotForMe);
    }

    #[test]
    fn test_rewrapped_channel_payload_loses_attribution() {
        let channel = Arc::new(derive_channel_key("default"));
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let cipher = ChannelCipher::new(channel.symmetric_key());

        let genuine = encode_public(b"hello", &channel, 20, Some(&alice)).unwrap();
        let plaintext = cipher.decrypt(&genuine.ciphertext).unwrap();

        // Any channel member can re-encrypt the signed payload under a new timestamp
        let replayed = EnvelopeDraft {
            timestamp: genuine.timestamp + 3600,
            ciphertext: cipher.encrypt(&plaintext).unwrap(),
            ..genuine.clone()
        };
        let later = options().at(replayed.timestamp);
        assert_eq!(
            decode_at(&stamp(replayed), &[channel.clone()], &bob, &later),
            Decoded::Invalid(InvalidReason::BadSignature)
        );

        let stretched = EnvelopeDraft {
            ttl: 3600,
            ciphertext: cipher.encrypt(&plaintext).unwrap(),
            ..genuine
        };
        assert_eq!(
            decode_at(&stamp(stretched), &[channel], &bob, &options()),
            Decoded::Invalid(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn test_forwarded_private_payload_loses_attribution() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let carol = Identity::generate().unwrap();

        let genuine =
            encode_private(b"for bob", bob.public_key(), 20, DEFAULT_PRIVATE_TOPIC, Some(&alice))
                .unwrap();
        let plaintext = open_with(&bob, &genuine.ciphertext).unwrap();

        // Bob re-seals Alice's signed payload to Carol
        let forwarded = EnvelopeDraft {
            ciphertext: seal_for(carol.public_key(), &plaintext).unwrap(),
            ..genuine
        };
        assert_eq!(
            decode_at(&stamp(forwarded), &[], &carol, &options()),
            Decoded::Invalid(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn test_unknown_channel_is_not_for_me() {
        let secret_room = derive_channel_key("secret-room");
        let bob = Identity::generate().unwrap();
        let bytes = stamp(encode_public(b"hi", &secret_room, 20, None).unwrap());

        let joined = vec![Arc::new(derive_channel_key("default"))];
        assert_eq!(decode_at(&bytes, &joined, &bob, &options()), Decoded::NotForMe);
    }

    #[test]
    fn test_first_matching_channel_wins() {
        let key = [3u8; 32];
        let first = Arc::new(ChannelKey::with_key("first", Topic([1, 1, 1, 1]), key));
        let second = Arc::new(ChannelKey::with_key("second", Topic([1, 1, 1, 1]), key));
        let bob = Identity::generate().unwrap();

        let bytes = stamp(encode_public(b"x", &second, 20, None).unwrap());
        match decode_at(&bytes, &[first, second], &bob, &options()) {
            Decoded::Message(msg) => assert_eq!(msg.channel_name(), Some("first")),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_is_invalid() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let draft = encode_public(b"old", &channel, 20, None).unwrap();
        let sent = draft.timestamp;
        let bytes = stamp(draft);

        let later = options().at(sent + 21);
        assert_eq!(
            decode_at(&bytes, &[channel.clone()], &bob, &later),
            Decoded::Invalid(InvalidReason::Expired)
        );

        // Exactly at expiry is still alive
        let edge = options().at(sent + 20);
        assert!(matches!(
            decode_at(&bytes, &[channel], &bob, &edge),
            Decoded::Message(_)
        ));
    }

    #[test]
    fn test_future_timestamp_is_invalid() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let draft = encode_public(b"future", &channel, 20, None).unwrap();
        let sent = draft.timestamp;
        let bytes = stamp(draft);

        let past = options().at(sent - CLOCK_SKEW_ALLOWANCE - 1);
        assert_eq!(
            decode_at(&bytes, &[channel], &bob, &past),
            Decoded::Invalid(InvalidReason::FromFuture)
        );
    }

    #[test]
    fn test_insufficient_work_is_invalid() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let bytes = stamp(encode_public(b"cheap", &channel, 20, None).unwrap());

        let strict = DecodeOptions::new(f64::MAX);
        assert!(matches!(
            decode_at(&bytes, &[channel], &bob, &strict),
            Decoded::Invalid(InvalidReason::InsufficientWork(_))
        ));
    }

    #[test]
    fn test_zero_ttl_envelope_is_invalid() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let mut draft = encode_public(b"x", &channel, 20, None).unwrap();
        draft.ttl = 0;
        let envelope = draft.seal(&pow::PowStamp {
            nonce: 0,
            work: 0.0,
            iterations: 1,
            met_target: false,
        });
        let bytes = envelope.to_bytes().unwrap();

        assert_eq!(
            decode_at(&bytes, &[channel], &bob, &DecodeOptions::new(0.0)),
            Decoded::Invalid(InvalidReason::ZeroTtl)
        );
    }

    #[test]
    fn test_unsupported_version_is_invalid() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let draft = encode_public(b"x", &channel, 20, None).unwrap();
        let mut envelope = Envelope::from_bytes(&stamp(draft)).unwrap();
        envelope.version = 9;

        assert_eq!(
            decode_at(&envelope.to_bytes().unwrap(), &[channel], &bob, &DecodeOptions::new(0.0)),
            Decoded::Invalid(InvalidReason::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_short_ciphertext_is_truncated() {
        let channel = Arc::new(derive_channel_key("default"));
        let bob = Identity::generate().unwrap();
        let mut envelope = Envelope::from_bytes(&stamp(
            encode_public(b"x", &channel, 20, None).unwrap(),
        ))
        .unwrap();
        assert_eq!(envelope.ciphertext.len(), MIN_CIPHERTEXT_LEN);

        envelope.ciphertext.pop();
        assert_eq!(
            decode_at(&envelope.to_bytes().unwrap(), &[channel], &bob, &DecodeOptions::new(0.0)),
            Decoded::Invalid(InvalidReason::Truncated(MIN_CIPHERTEXT_LEN - 1))
        );
    }

    #[test]
    fn test_garbage_is_invalid() {
        let bob = Identity::generate().unwrap();
        for bytes in [vec![], vec![1], vec![0xFF; 7], vec![1, 0x11, 0x22]] {
            assert_eq!(
                decode_at(&bytes, &[], &bob, &options()),
                Decoded::Invalid(InvalidReason::Malformed)
            );
        }
    }

    #[test]
    fn test_oversized_is_invalid() {
        let bob = Identity::generate().unwrap();
        let bytes = vec![0u8; MAX_ENVELOPE_SIZE + 1];
        assert_eq!(
            decode_at(&bytes, &[], &bob, &options()),
            Decoded::Invalid(InvalidReason::TooLarge(MAX_ENVELOPE_SIZE + 1))
        );
    }

    #[test]
    fn test_encode_rejects_bad_ttl() {
        let channel = derive_channel_key("default");
        assert!(matches!(
            encode_public(b"x", &channel, 0, None),
            Err(ChatError::InvalidTtl(0))
        ));
        assert!(matches!(
            encode_public(b"x", &channel, MAX_TTL + 1, None),
            Err(ChatError::InvalidTtl(_))
        ));
    }

    #[test]
    fn test_encode_rejects_huge_payload() {
        let channel = derive_channel_key("default");
        let body = vec![0u8; MAX_ENVELOPE_SIZE];
        assert!(matches!(
            encode_public(&body, &channel, 20, None),
            Err(ChatError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_no_plaintext_on_wire() {
        let channel = derive_channel_key("default");
        let body = b"a very recognisable plaintext marker";
        let bytes = stamp(encode_public(body, &channel, 20, None).unwrap());

        assert!(!bytes.windows(body.len()).any(|w| w == body));
    }
}

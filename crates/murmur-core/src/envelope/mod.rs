//! Encrypted, PoW-stamped, TTL-bounded envelopes
//!
//! The envelope is the only thing that crosses the transport boundary.
//! Plaintext never leaves this module unencrypted.
//!
//! ## Wire Format
//!
//! Envelopes are postcard-encoded:
//!
//! ```text
//! +---------+-------+-----------+-----+------------+------------+-------+
//! | version | topic | timestamp | ttl | pow_target | ciphertext | nonce |
//! |   u8    |  [4]  |  u64 (s)  | u32 |    f64     |  bytes     |  u64  |
//! +---------+-------+-----------+-----+------------+------------+-------+
//! ```
//!
//! Proof-of-work is computed over [`EnvelopeDraft::pow_data`], an explicit
//! little-endian layout of every field except the nonce, so that work values
//! do not depend on serializer details.

mod codec;
mod message;
mod payload;

pub use codec::{
    decode, decode_at, encode_private, encode_public, open, validate, DecodeOptions, Decoded,
    InvalidReason, MIN_CIPHERTEXT_LEN,
};
pub use message::{Delivery, InboundMessage};

use serde::{Deserialize, Serialize};

use crate::channel::Topic;
use crate::error::{ChatError, ChatResult};
use crate::pow::PowStamp;

/// Current envelope protocol version
pub const ENVELOPE_VERSION: u8 = 1;

/// Largest envelope accepted from or handed to the transport
pub const MAX_ENVELOPE_SIZE: usize = 512 * 1024;

/// Longest TTL a sender may request
pub const MAX_TTL: u32 = 3600;

/// How far in the future a timestamp may be before it is rejected
pub const CLOCK_SKEW_ALLOWANCE: u64 = 10;

/// Size of the nonce counted into the work formula
const NONCE_LEN: usize = 8;

/// An envelope that has been encrypted but not yet stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeDraft {
    /// Pub/sub topic
    pub topic: Topic,
    /// Creation time (unix seconds)
    pub timestamp: u64,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Declared proof-of-work target (informational for receivers)
    pub pow_target: f64,
    /// Encrypted payload
    pub ciphertext: Vec<u8>,
}

impl EnvelopeDraft {
    /// Bytes covered by proof-of-work (everything except the nonce).
    pub fn pow_data(&self) -> Vec<u8> {
        pow_data(
            ENVELOPE_VERSION,
            self.topic,
            self.timestamp,
            self.ttl,
            self.pow_target,
            &self.ciphertext,
        )
    }

    /// Size used by the work formula
    pub fn size(&self) -> usize {
        pow_data_len(self.ciphertext.len()) + NONCE_LEN
    }

    /// Finish the envelope with a proof-of-work stamp.
    pub fn seal(self, stamp: &PowStamp) -> Envelope {
        Envelope {
            version: ENVELOPE_VERSION,
            topic: self.topic,
            timestamp: self.timestamp,
            ttl: self.ttl,
            pow_target: self.pow_target,
            ciphertext: self.ciphertext,
            nonce: stamp.nonce,
        }
    }
}

/// A stamped envelope as published to and received from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for forward compatibility
    pub version: u8,
    /// Pub/sub topic
    pub topic: Topic,
    /// Creation time (unix seconds)
    pub timestamp: u64,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Work the sender aimed for
    pub pow_target: f64,
    /// Encrypted payload
    pub ciphertext: Vec<u8>,
    /// Proof-of-work nonce
    pub nonce: u64,
}

impl Envelope {
    /// Bytes covered by proof-of-work
    pub fn pow_data(&self) -> Vec<u8> {
        pow_data(
            self.version,
            self.topic,
            self.timestamp,
            self.ttl,
            self.pow_target,
            &self.ciphertext,
        )
    }

    /// Size used by the work formula
    pub fn size(&self) -> usize {
        pow_data_len(self.ciphertext.len()) + NONCE_LEN
    }

    /// Unix time after which the envelope must be discarded
    pub fn expiry(&self) -> u64 {
        self.timestamp.saturating_add(u64::from(self.ttl))
    }

    /// Encode for transmission
    pub fn to_bytes(&self) -> ChatResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode envelope: {}", e)))
    }

    /// Decode from the wire.
    ///
    /// Trailing bytes after a complete envelope are rejected.
    pub fn from_bytes(bytes: &[u8]) -> ChatResult<Self> {
        let (envelope, rest) = postcard::take_from_bytes::<Self>(bytes)
            .map_err(|e| ChatError::Serialization(format!("Failed to decode envelope: {}", e)))?;
        if !rest.is_empty() {
            return Err(ChatError::Serialization(format!(
                "{} trailing bytes after envelope",
                rest.len()
            )));
        }
        Ok(envelope)
    }

    /// Content hash used for duplicate suppression
    pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
        *blake3::hash(bytes).as_bytes()
    }
}

fn pow_data(
    version: u8,
    topic: Topic,
    timestamp: u64,
    ttl: u32,
    pow_target: f64,
    ciphertext: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(pow_data_len(ciphertext.len()));
    data.push(version);
    data.extend_from_slice(topic.as_bytes());
    data.extend_from_slice(&timestamp.to_le_bytes());
    data.extend_from_slice(&ttl.to_le_bytes());
    data.extend_from_slice(&pow_target.to_bits().to_le_bytes());
    data.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
    data.extend_from_slice(ciphertext);
    data
}

const fn pow_data_len(ciphertext_len: usize) -> usize {
    1 + 4 + 8 + 4 + 8 + 4 + ciphertext_len
}

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(nonce: u64) -> PowStamp {
        PowStamp {
            nonce,
            work: 0.0,
            iterations: 1,
            met_target: false,
        }
    }

    fn draft() -> EnvelopeDraft {
        EnvelopeDraft {
            topic: Topic([1, 2, 3, 4]),
            timestamp: 1_700_000_000,
            ttl: 20,
            pow_target: 2.0,
            ciphertext: vec![9; 40],
        }
    }

    #[test]
    fn test_pow_data_matches_after_seal() {
        let draft = draft();
        let expected = draft.pow_data();
        let size = draft.size();

        let envelope = draft.seal(&stamp(77));

        assert_eq!(envelope.pow_data(), expected);
        assert_eq!(envelope.size(), size);
        assert_eq!(envelope.nonce, 77);
    }

    #[test]
    fn test_pow_data_excludes_nonce() {
        let mut a = draft().seal(&stamp(1));
        let before = a.pow_data();
        a.nonce = 2;
        assert_eq!(a.pow_data(), before);
    }

    #[test]
    fn test_pow_data_len() {
        assert_eq!(draft().pow_data().len(), pow_data_len(40));
    }

    #[test]
    fn test_bytes_roundtrip_and_topic_length() {
        let envelope = draft().seal(&stamp(5));
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);

        // Topic sits right after the version byte
        assert_eq!(&bytes[1..5], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let bytes = draft()
            .seal(&stamp(5))
            .to_bytes()
            .unwrap();

        for cut in [0, 1, 3, bytes.len() / 2, bytes.len() - 1] {
            assert!(Envelope::from_bytes(&bytes[..cut]).is_err(), "accepted cut {}", cut);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = draft()
            .seal(&stamp(5))
            .to_bytes()
            .unwrap();
        bytes.push(0);
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_expiry_saturates() {
        let mut envelope = draft().seal(&stamp(0));
        envelope.timestamp = u64::MAX;
        assert_eq!(envelope.expiry(), u64::MAX);
    }
}

//! Inner payload carried inside the ciphertext
//!
//! ```text
//! postcard(Payload { body, signature }) || zero padding
//! ```
//!
//! The payload is self-delimiting, so padding is simply whatever follows it.
//! Padding rounds the plaintext up to a multiple of [`PADDING_BLOCK`] so
//! ciphertext length leaks only a coarse size class.
//!
//! A sender signature commits to the envelope topic, timestamp and TTL,
//! and to the addressee of a private message. Re-wrapping a signed payload
//! under a fresh timestamp, or re-sealing it to somebody else, breaks the
//! signature.

use serde::{Deserialize, Serialize};

use crate::channel::Topic;
use crate::error::{ChatError, ChatResult};
use crate::identity::{Identity, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};

/// Plaintext is padded to a multiple of this many bytes
pub const PADDING_BLOCK: usize = 256;

/// Domain separation for sender signatures
const SIGNATURE_DOMAIN: &[u8] = b"murmur-sig-v1:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    body: Vec<u8>,
    signature: Option<SenderSignature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SenderSignature {
    public_key: Vec<u8>,
    signature: Vec<u8>,
}

/// Envelope fields a sender signature is bound to
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SignedContext<'a> {
    pub topic: Topic,
    pub timestamp: u64,
    pub ttl: u32,
    /// Addressee of a private message; `None` on a channel
    pub recipient: Option<&'a PublicKey>,
}

/// A payload opened from decrypted bytes
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenedPayload {
    pub body: Vec<u8>,
    /// Verified signer, if the payload was signed
    pub signer: Option<PublicKey>,
}

/// Why an opened payload was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PayloadError {
    Malformed,
    BadSignature,
}

/// Build padded plaintext, signing it over `context` when a signer is given.
pub(crate) fn build(
    body: &[u8],
    context: &SignedContext<'_>,
    signer: Option<&Identity>,
) -> ChatResult<Vec<u8>> {
    let signature = signer.map(|identity| SenderSignature {
        public_key: identity.public_key().as_bytes().to_vec(),
        signature: identity.sign(&signed_data(context, body)).to_vec(),
    });

    let payload = Payload {
        body: body.to_vec(),
        signature,
    };
    let mut bytes = postcard::to_allocvec(&payload)
        .map_err(|e| ChatError::Serialization(format!("Failed to encode payload: {}", e)))?;

    let padded_len = bytes.len().div_ceil(PADDING_BLOCK) * PADDING_BLOCK;
    bytes.resize(padded_len.max(PADDING_BLOCK), 0);
    Ok(bytes)
}

/// Parse decrypted plaintext and verify the signature against `context`.
pub(crate) fn open(
    plaintext: &[u8],
    context: &SignedContext<'_>,
) -> Result<OpenedPayload, PayloadError> {
    let (payload, _padding) =
        postcard::take_from_bytes::<Payload>(plaintext).map_err(|_| PayloadError::Malformed)?;

    let signer = match payload.signature {
        None => None,
        Some(sig) => {
            if sig.public_key.len() != PUBLIC_KEY_LEN || sig.signature.len() != SIGNATURE_LEN {
                return Err(PayloadError::BadSignature);
            }
            let key = PublicKey::from_bytes(&sig.public_key)
                .map_err(|_| PayloadError::BadSignature)?;
            if !key.verify(&signed_data(context, &payload.body), &sig.signature) {
                return Err(PayloadError::BadSignature);
            }
            Some(key)
        }
    };

    Ok(OpenedPayload {
        body: payload.body,
        signer,
    })
}

/// `domain || topic || timestamp || ttl || kind || [recipient] || body`
fn signed_data(context: &SignedContext<'_>, body: &[u8]) -> Vec<u8> {
    let mut data =
        Vec::with_capacity(SIGNATURE_DOMAIN.len() + 4 + 8 + 4 + 1 + PUBLIC_KEY_LEN + body.len());
    data.extend_from_slice(SIGNATURE_DOMAIN);
    data.extend_from_slice(context.topic.as_bytes());
    data.extend_from_slice(&context.timestamp.to_le_bytes());
    data.extend_from_slice(&context.ttl.to_le_bytes());
    match context.recipient {
        None => data.push(0),
        Some(recipient) => {
            data.push(1);
            data.extend_from_slice(recipient.as_bytes());
        }
    }
    data.extend_from_slice(body);
    data
}

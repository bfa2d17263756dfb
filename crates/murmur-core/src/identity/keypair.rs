//! secp256k1 identity keypair
//!
//! The public half is the user's contact address: a 65-byte SEC1
//! uncompressed point, shared as `0x` followed by 130 hex characters.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;

use crate::error::{ChatError, ChatResult};

/// Length of an uncompressed SEC1 public key
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a compact ECDSA signature (r || s)
pub const SIGNATURE_LEN: usize = 64;

/// SEC1 tag byte for uncompressed points
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Attempts before giving up on drawing an in-range scalar
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// A validated secp256k1 public key.
///
/// Construction always checks the length, the uncompressed tag and that the
/// point lies on the curve, so holders of a `PublicKey` never handle
/// malformed key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    /// Parse a raw 65-byte uncompressed key.
    pub fn from_bytes(bytes: &[u8]) -> ChatResult<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(ChatError::InvalidRecipient(format!(
                "expected {} key bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != UNCOMPRESSED_TAG {
            return Err(ChatError::InvalidRecipient(format!(
                "key must start with 0x04, found 0x{:02x}",
                bytes[0]
            )));
        }
        k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| ChatError::InvalidRecipient("key is not a curve point".to_string()))?;

        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse the `0x`-prefixed hex form (exactly 130 hex digits).
    pub fn from_hex(s: &str) -> ChatResult<Self> {
        let digits = s.strip_prefix("0x").ok_or_else(|| {
            ChatError::InvalidRecipient("key must start with 0x".to_string())
        })?;
        if digits.len() != PUBLIC_KEY_LEN * 2 {
            return Err(ChatError::InvalidRecipient(format!(
                "expected {} hex digits, got {}",
                PUBLIC_KEY_LEN * 2,
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| ChatError::InvalidRecipient(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.bytes[1..5]))
    }

    /// Verify an ECDSA signature made by the matching identity.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }

    pub(crate) fn to_k256(self) -> ChatResult<k256::PublicKey> {
        k256::PublicKey::from_sec1_bytes(&self.bytes)
            .map_err(|_| ChatError::Crypto("key is not a curve point".to_string()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

impl FromStr for PublicKey {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// The process's asymmetric identity.
///
/// Created once at startup and held in memory only. The secret scalar is
/// never serialized, and `Debug` prints the public half alone.
pub struct Identity {
    secret: SecretKey,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh keypair from the operating system's entropy source.
    ///
    /// # Errors
    ///
    /// `ChatError::CryptoUnavailable` if the entropy source fails.
    pub fn generate() -> ChatResult<Self> {
        Ok(Self::from_secret(random_secret()?))
    }

    /// Rebuild an identity from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> ChatResult<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| ChatError::Crypto("secret scalar out of range".to_string()))?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = public_key_for(&secret);
        Self { secret, public }
    }

    /// The shareable contact address
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign a message (ECDSA over SHA-256).
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key.sign(message);

        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        out
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Draw a secret scalar from the OS entropy source.
///
/// Uses getrandom directly to avoid rand_core version conflicts with k256.
pub(crate) fn random_secret() -> ChatResult<SecretKey> {
    let mut seed = [0u8; 32];
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        getrandom::getrandom(&mut seed)
            .map_err(|e| ChatError::CryptoUnavailable(format!("entropy source failed: {}", e)))?;
        if let Ok(secret) = SecretKey::from_slice(&seed) {
            return Ok(secret);
        }
    }
    Err(ChatError::CryptoUnavailable(
        "could not draw a valid secret scalar".to_string(),
    ))
}

pub(crate) fn public_key_for(secret: &SecretKey) -> PublicKey {
    let point = secret.public_key().to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_LEN];
    bytes.copy_from_slice(point.as_bytes());
    PublicKey { bytes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_public_key_format() {
        let identity = Identity::generate().unwrap();
        let pk = identity.public_key();

        assert_eq!(pk.as_bytes()[0], 0x04);
        let hex = pk.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 2 + 130);
    }

    #[test]
    fn test_hex_roundtrip() {
        let identity = Identity::generate().unwrap();
        let parsed: PublicKey = identity.public_key().to_hex().parse().unwrap();
        assert_eq!(&parsed, identity.public_key());
    }

    #[test]
    fn test_from_secret_bytes_is_deterministic() {
        let a = Identity::from_secret_bytes(&[42u8; 32]).unwrap();
        let b = Identity::from_secret_bytes(&[42u8; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(Identity::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        let err = PublicKey::from_hex("0xabcd").unwrap_err();
        assert!(matches!(err, ChatError::InvalidRecipient(_)));
    }

    #[test]
    fn test_rejects_missing_prefix() {
        let identity = Identity::generate().unwrap();
        let bare = identity.public_key().to_hex()[2..].to_string();
        assert!(PublicKey::from_hex(&bare).is_err());
    }

    #[test]
    fn test_rejects_non_hex() {
        let bogus = format!("0x{}", "zz".repeat(65));
        assert!(PublicKey::from_hex(&bogus).is_err());
    }

    #[test]
    fn test_rejects_off_curve_point() {
        let mut bytes = [0xFFu8; PUBLIC_KEY_LEN];
        bytes[0] = 0x04;
        assert!(PublicKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_compressed_tag() {
        let identity = Identity::generate().unwrap();
        let mut bytes = *identity.public_key().as_bytes();
        bytes[0] = 0x02;
        assert!(PublicKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_sign_verify() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();

        let sig = alice.sign(b"hello");
        assert!(alice.public_key().verify(b"hello", &sig));
        assert!(!alice.public_key().verify(b"hellO", &sig));
        assert!(!bob.public_key().verify(b"hello", &sig));
    }

    #[test]
    fn test_verify_garbage_signature() {
        let alice = Identity::generate().unwrap();
        assert!(!alice.public_key().verify(b"hello", &[0u8; 3]));
        assert!(!alice.public_key().verify(b"hello", &[0u8; SIGNATURE_LEN]));
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = Identity::from_secret_bytes(&[7u8; 32]).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("PublicKey"));
        assert!(!debug.contains(&hex::encode([7u8; 32])));
    }
}

//! Sealed boxes for private messages (ECIES over secp256k1)
//!
//! ```text
//! 1. eph_sk <- random, eph_pk = eph_sk * G
//! 2. ss  = ECDH(eph_sk, recipient_pk)
//! 3. key = HKDF-SHA256(salt = eph_pk, ikm = ss, info = "murmur-ecies-v1")
//! 4. box = eph_pk (65) || ChaCha20-Poly1305(key, plaintext)
//! ```
//!
//! Only the holder of the recipient's secret key can recompute `ss`.

use hkdf::Hkdf;
use k256::ecdh::diffie_hellman;
use sha2::Sha256;

use super::keypair::{public_key_for, random_secret, Identity, PublicKey, PUBLIC_KEY_LEN};
use crate::crypto::{ChannelCipher, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{ChatError, ChatResult};

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"murmur-ecies-v1";

/// Smallest well-formed sealed box (empty plaintext)
pub const SEALED_OVERHEAD: usize = PUBLIC_KEY_LEN + NONCE_SIZE + TAG_SIZE;

/// Encrypt `plaintext` so that only `recipient` can open it.
pub fn seal_for(recipient: &PublicKey, plaintext: &[u8]) -> ChatResult<Vec<u8>> {
    let ephemeral = random_secret()?;
    let ephemeral_public = public_key_for(&ephemeral);

    let recipient_point = recipient.to_k256()?;
    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient_point.as_affine());
    let key = derive_key(shared.raw_secret_bytes(), ephemeral_public.as_bytes());

    let ciphertext = ChannelCipher::new(&key).encrypt(plaintext)?;

    let mut sealed = Vec::with_capacity(PUBLIC_KEY_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box with our identity.
///
/// Returns an error when the box was sealed for someone else, was
/// tampered with, or is malformed.
pub fn open_with(identity: &Identity, sealed: &[u8]) -> ChatResult<Vec<u8>> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(ChatError::Crypto(format!(
            "Sealed box too short: {} bytes",
            sealed.len()
        )));
    }

    let (ephemeral_bytes, ciphertext) = sealed.split_at(PUBLIC_KEY_LEN);
    let ephemeral = k256::PublicKey::from_sec1_bytes(ephemeral_bytes)
        .map_err(|_| ChatError::Crypto("Invalid ephemeral key".to_string()))?;

    let shared = diffie_hellman(identity.secret().to_nonzero_scalar(), ephemeral.as_affine());
    let key = derive_key(shared.raw_secret_bytes(), ephemeral_bytes);

    ChannelCipher::new(&key).decrypt(ciphertext)
}

fn derive_key(shared_secret: &[u8], salt: &[u8]) -> [u8; KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut output = [0u8; KEY_SIZE];
    hkdf.expand(HKDF_INFO, &mut output)
        .expect("HKDF expand should never fail with 32-byte output");
    output
}

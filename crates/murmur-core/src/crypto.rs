//! Symmetric channel encryption using ChaCha20-Poly1305 AEAD
//!
//! Channel envelopes are sealed under the channel's 32-byte symmetric key.
//! The same primitive also finishes the asymmetric path: ECIES derives a
//! one-off key and hands it to [`ChannelCipher`].
//!
//! # Wire Format
//!
//! `[nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)]`

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use crate::error::{ChatError, ChatResult};

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended by ChaCha20-Poly1305
pub const TAG_SIZE: usize = 16;

/// Symmetric key length
pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 cipher bound to one symmetric key.
///
/// ```
/// use murmur_core::crypto::ChannelCipher;
///
/// let cipher = ChannelCipher::new(&[7u8; 32]);
/// let sealed = cipher.encrypt(b"hello").unwrap();
/// assert_eq!(cipher.decrypt(&sealed).unwrap(), b"hello");
/// ```
pub struct ChannelCipher {
    cipher: ChaCha20Poly1305,
}

impl ChannelCipher {
    /// Create a cipher from a 32-byte key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Encrypt with a fresh random nonce, returned prepended to the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> ChatResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| ChatError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt `[nonce || ciphertext+tag]`.
    ///
    /// Fails on a wrong key, tampering, or input shorter than nonce + tag.
    pub fn decrypt(&self, sealed: &[u8]) -> ChatResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ChatError::Crypto(format!(
                "Ciphertext too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| ChatError::Crypto(format!("Decryption failed: {}", e)))
    }
}

//! Identity manager
//!
//! Each running node owns exactly one secp256k1 keypair, generated at startup
//! and never persisted. The public key is the user's contact address; other
//! users address private messages to it.
//!
//! ## Example
//!
//! ```rust
//! use murmur_core::identity::{generate_identity, public_key_of, seal_for, open_with};
//!
//! let bob = generate_identity().unwrap();
//! let address = public_key_of(&bob).to_hex();
//!
//! let recipient = address.parse().unwrap();
//! let sealed = seal_for(&recipient, b"hi bob").unwrap();
//! assert_eq!(open_with(&bob, &sealed).unwrap(), b"hi bob");
//! ```

mod keypair;
mod sealed;

pub use keypair::{Identity, PublicKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};
pub use sealed::{open_with, seal_for, SEALED_OVERHEAD};

use crate::error::ChatResult;

/// Generate a fresh identity from the secure random source.
///
/// Fails with `ChatError::CryptoUnavailable` when no entropy is available.
pub fn generate_identity() -> ChatResult<Identity> {
    let identity = Identity::generate()?;
    tracing::info!(public_key = %identity.public_key().short(), "Identity generated");
    Ok(identity)
}

/// The identity's shareable public key
pub fn public_key_of(identity: &Identity) -> &PublicKey {
    identity.public_key()
}

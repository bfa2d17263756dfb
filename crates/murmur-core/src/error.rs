//! Error types for Murmur

use thiserror::Error;

/// Main error type for Murmur operations
///
/// Inbound envelope problems are deliberately absent: decoding is total and
/// reports [`crate::envelope::Decoded::Invalid`] instead of failing.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The secure random source could not be used (fatal at startup)
    #[error("Crypto unavailable: {0}")]
    CryptoUnavailable(String),

    /// The relay network could not be reached (fatal at startup)
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(String),

    /// Recipient public key failed format validation
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// User command did not match the command grammar
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Channel could not be resolved
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Proof-of-work search ended below the minimum the network accepts
    #[error("Insufficient proof-of-work: achieved {achieved:.4}, required {required:.4}")]
    InsufficientWork {
        /// Work value of the best stamp found
        achieved: f64,
        /// Minimum acceptable work
        required: f64,
    },

    /// Plaintext too large to fit in an envelope
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Encoded size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// TTL outside the accepted range
    #[error("Invalid TTL: {0}")]
    InvalidTtl(u32),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during gossip protocol operations
    #[error("Gossip error: {0}")]
    Gossip(String),

    /// Network-related error
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration rejected by validation
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether this error must abort startup rather than be shown to the user
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::CryptoUnavailable(_) | ChatError::TransportUnreachable(_)
        )
    }
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;

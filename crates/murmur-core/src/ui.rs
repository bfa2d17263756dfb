//! Presentation collaborator
//!
//! The core never renders anything itself. It pushes identity, messages and
//! per-message errors through [`ChatUi`].

use std::fmt;

use crate::identity::PublicKey;

/// Who a displayed message is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SenderId {
    /// A private message, or our own echo, attributed to a public key
    Peer(PublicKey),
    /// A channel message, with the verified signer if the payload was signed
    Channel {
        /// Channel name
        name: String,
        /// Verified sender public key
        signer: Option<PublicKey>,
    },
    /// An unsigned private message
    Anonymous,
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderId::Peer(key) => write!(f, "{}", key.short()),
            SenderId::Channel { name, signer: Some(key) } => {
                write!(f, "#{} {}", name, key.short())
            }
            SenderId::Channel { name, signer: None } => write!(f, "#{}", name),
            SenderId::Anonymous => write!(f, "anonymous"),
        }
    }
}

/// Callbacks into the presentation layer.
pub trait ChatUi: Send + Sync + 'static {
    /// Show the user's own contact address
    fn set_user_public_key(&self, public_key: &PublicKey);

    /// Show a decoded or locally echoed message
    fn add_message(&self, sender: &SenderId, text: &str);

    /// Show a recoverable per-message error
    fn add_error(&self, message: &str);
}

//! User command grammar
//!
//! ```text
//! /msg <0x + 130 hex digits> <body>   private message
//! anything else                       public message to the active channel
//! ```
//!
//! A line whose first word is `/msg` is always a private-message attempt;
//! when it is malformed it becomes [`Command::Invalid`] instead of leaking
//! out as a public message.

use std::fmt;

use crate::error::ChatError;
use crate::identity::PublicKey;

/// Private-message directive
pub const PRIVATE_PREFIX: &str = "/msg";

/// A parsed user command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Broadcast to the active channel
    Public {
        /// Message text
        body: String,
    },
    /// Encrypt to a single recipient
    Private {
        /// Validated recipient key
        recipient: PublicKey,
        /// Message text
        body: String,
    },
    /// A `/msg` line that does not match the grammar
    Invalid(CommandError),
}

/// Why a `/msg` line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No recipient after `/msg`
    MissingRecipient,
    /// Recipient key failed validation
    BadRecipient(String),
    /// Valid recipient but nothing to send
    MissingBody,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::MissingRecipient => {
                write!(f, "usage: {} <public key> <message>", PRIVATE_PREFIX)
            }
            CommandError::BadRecipient(reason) => write!(f, "{}", reason),
            CommandError::MissingBody => write!(f, "message body is empty"),
        }
    }
}

impl From<CommandError> for ChatError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::BadRecipient(reason) => ChatError::InvalidRecipient(reason),
            other => ChatError::MalformedCommand(other.to_string()),
        }
    }
}

/// Parse one line of user input. Total: every input maps to a command.
pub fn parse_command(input: &str) -> Command {
    let line = input.trim_end_matches(['\r', '\n']);

    let Some(rest) = strip_directive(line) else {
        return Command::Public {
            body: line.to_string(),
        };
    };

    let rest = rest.trim_start();
    let (key, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if key.is_empty() {
        return Command::Invalid(CommandError::MissingRecipient);
    }

    let recipient = match PublicKey::from_hex(key) {
        Ok(recipient) => recipient,
        Err(ChatError::InvalidRecipient(reason)) => {
            return Command::Invalid(CommandError::BadRecipient(reason))
        }
        Err(other) => return Command::Invalid(CommandError::BadRecipient(other.to_string())),
    };

    if body.trim().is_empty() {
        return Command::Invalid(CommandError::MissingBody);
    }

    Command::Private {
        recipient,
        body: body.to_string(),
    }
}

/// The text after `/msg` when it is the first word of the line
fn strip_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(PRIVATE_PREFIX)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

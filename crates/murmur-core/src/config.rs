//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{Topic, DEFAULT_PRIVATE_TOPIC};
use crate::envelope::MAX_TTL;
use crate::error::{ChatError, ChatResult};

/// Default channel joined at startup
pub const DEFAULT_CHANNEL: &str = "default";

/// Default envelope TTL in seconds
pub const DEFAULT_TTL: u32 = 20;

/// Default proof-of-work search budget
pub const DEFAULT_POW_TIME: Duration = Duration::from_secs(5);

/// Default work a sender aims for
pub const DEFAULT_POW_TARGET: f64 = 2.0;

/// Default minimum work accepted on receipt and on send
pub const DEFAULT_MIN_POW: f64 = 0.2;

/// Options recognised by a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Active channel for public messages
    pub channel_name: String,
    /// Private-message topic, shared network-wide
    pub topic: Topic,
    /// Envelope time-to-live in seconds
    pub ttl: u32,
    /// Proof-of-work search budget per envelope
    pub pow_time: Duration,
    /// Work a sender aims for
    pub pow_target: f64,
    /// Minimum work accepted; also the floor below which sends are aborted
    pub min_pow: f64,
    /// Extra channels to join (receive only) besides the active one
    pub join: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL.to_string(),
            topic: DEFAULT_PRIVATE_TOPIC,
            ttl: DEFAULT_TTL,
            pow_time: DEFAULT_POW_TIME,
            pow_target: DEFAULT_POW_TARGET,
            min_pow: DEFAULT_MIN_POW,
            join: Vec::new(),
        }
    }
}

impl ChatConfig {
    /// Reject settings the network would not accept.
    pub fn validate(&self) -> ChatResult<()> {
        if self.channel_name.trim().is_empty() {
            return Err(ChatError::Config("channel name must not be empty".into()));
        }
        if let Some(empty) = self.join.iter().position(|n| n.trim().is_empty()) {
            return Err(ChatError::Config(format!(
                "joined channel #{} has an empty name",
                empty + 1
            )));
        }
        if self.ttl == 0 || self.ttl > MAX_TTL {
            return Err(ChatError::Config(format!(
                "ttl must be between 1 and {} seconds, got {}",
                MAX_TTL, self.ttl
            )));
        }
        if self.pow_time.is_zero() {
            return Err(ChatError::Config("pow_time must be positive".into()));
        }
        for (name, value) in [("pow_target", self.pow_target), ("min_pow", self.min_pow)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ChatError::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.min_pow > self.pow_target {
            return Err(ChatError::Config(format!(
                "min_pow ({}) must not exceed pow_target ({})",
                self.min_pow, self.pow_target
            )));
        }
        Ok(())
    }

    /// Every channel name to join, active channel first, without repeats
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![self.channel_name.as_str()];
        for name in &self.join {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

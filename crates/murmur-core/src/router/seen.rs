//! Duplicate envelope suppression
//!
//! Relays re-deliver, and a node's own broadcast may come back to it. Each
//! envelope is remembered by the BLAKE3 hash of its bytes until it expires;
//! after that it would be rejected as expired anyway.
//!
//! Only a cache full of live entries forgets anything early. Those
//! evictions are counted, since a forgotten envelope can be shown again
//! if a relay re-delivers it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

/// Upper bound on remembered envelopes
pub const MAX_SEEN_ENVELOPES: usize = 16 * 1024;

/// Envelope hashes with their expiry (unix seconds)
#[derive(Debug, Default)]
pub struct SeenCache {
    entries: Mutex<HashMap<[u8; 32], u64>>,
    evicted: AtomicU64,
}

impl SeenCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash`, returning `false` if it was already present and live.
    pub fn insert(&self, hash: [u8; 32], expiry: u64, now: u64) -> bool {
        let mut entries = self.entries.lock();

        if let Some(&existing) = entries.get(&hash) {
            if existing >= now {
                return false;
            }
        }

        if entries.len() >= MAX_SEEN_ENVELOPES {
            entries.retain(|_, exp| *exp >= now);
        }
        if entries.len() >= MAX_SEEN_ENVELOPES {
            // Still full of live entries: forget the ones closest to expiry
            let mut expiries: Vec<u64> = entries.values().copied().collect();
            expiries.sort_unstable();
            let cutoff = expiries[expiries.len() / 2];
            let before = entries.len();
            entries.retain(|_, exp| *exp > cutoff);

            let evicted = (before - entries.len()) as u64;
            self.evicted.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted, cutoff, "Seen cache full, forgot live envelopes");
        }

        entries.insert(hash, expiry);
        true
    }

    /// Whether `hash` is remembered and still live at `now`
    pub fn contains(&self, hash: &[u8; 32], now: u64) -> bool {
        self.entries.lock().get(hash).is_some_and(|&exp| exp >= now)
    }

    /// Drop expired entries
    pub fn prune(&self, now: u64) {
        self.entries.lock().retain(|_, exp| *exp >= now);
    }

    /// Live entries forgotten because the cache was full
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Number of remembered entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

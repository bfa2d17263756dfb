//! Proof-of-work engine
//!
//! Senders spend bounded computation per envelope, proportional to its size
//! and TTL; receivers verify with a single hash.
//!
//! ```text
//! cost = BLAKE3(pow_data || nonce_le) as a 256-bit big-endian integer
//! work = 2^256 / ((cost + 1) * size * ttl)
//! ```
//!
//! Work is monotonic in cost: for equal size and TTL a smaller digest can
//! never yield less work. The nonce sequence starts at zero and increments,
//! so a search is fully determined by its draft and iteration count.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::envelope::{Envelope, EnvelopeDraft};
use crate::error::{ChatError, ChatResult};

/// Nonces hashed between clock and cancellation checks
const CHECK_INTERVAL: u64 = 1024;

/// Result of a proof-of-work search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowStamp {
    /// Best nonce found
    pub nonce: u64,
    /// Work value achieved by `nonce`
    pub work: f64,
    /// Nonces evaluated
    pub iterations: u64,
    /// Whether `work` reached the requested target
    pub met_target: bool,
}

/// Configured proof-of-work search.
///
/// The search stops at the first nonce meeting `target`, when `budget`
/// elapses, when the optional iteration cap is reached, or when the
/// cancellation token fires. It always evaluates at least one nonce and
/// returns the best candidate seen, even below target.
#[derive(Debug, Clone)]
pub struct PowSearch {
    target: f64,
    budget: Duration,
    max_iterations: Option<u64>,
    cancel: Option<CancellationToken>,
}

impl PowSearch {
    /// Search for `target` work within `budget` wall-clock time
    pub fn new(target: f64, budget: Duration) -> Self {
        Self {
            target,
            budget,
            max_iterations: None,
            cancel: None,
        }
    }

    /// Cap the number of nonces evaluated
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations.max(1));
        self
    }

    /// Abort the search early when `token` is cancelled
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the search on the current thread.
    pub fn run(&self, draft: &EnvelopeDraft) -> PowStamp {
        let started = Instant::now();
        let deadline = started + self.budget;

        let mut base = blake3::Hasher::new();
        base.update(&draft.pow_data());
        let size = draft.size();

        let mut best = PowStamp {
            nonce: 0,
            work: 0.0,
            iterations: 0,
            met_target: false,
        };

        let mut nonce: u64 = 0;
        loop {
            let mut hasher = base.clone();
            hasher.update(&nonce.to_le_bytes());
            let work = work_from_digest(hasher.finalize().as_bytes(), size, draft.ttl);
            best.iterations += 1;

            if work > best.work || best.iterations == 1 {
                best.nonce = nonce;
                best.work = work;
            }
            if best.work >= self.target {
                best.met_target = true;
                break;
            }
            if self.max_iterations.is_some_and(|max| best.iterations >= max) {
                break;
            }
            if best.iterations % CHECK_INTERVAL == 0 {
                if Instant::now() >= deadline {
                    break;
                }
                if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                    debug!(iterations = best.iterations, "Proof-of-work search cancelled");
                    break;
                }
            }
            nonce = nonce.wrapping_add(1);
        }

        debug!(
            iterations = best.iterations,
            work = best.work,
            target = self.target,
            met_target = best.met_target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Proof-of-work search finished"
        );
        best
    }

    /// Run the search on a blocking worker so async tasks keep running.
    pub async fn run_blocking(self, draft: EnvelopeDraft) -> ChatResult<(EnvelopeDraft, PowStamp)> {
        tokio::task::spawn_blocking(move || {
            let stamp = self.run(&draft);
            (draft, stamp)
        })
        .await
        .map_err(|e| ChatError::Crypto(format!("Proof-of-work worker failed: {}", e)))
    }
}

/// Stamp a draft: best-effort search for `target` work within `budget`.
pub fn stamp(draft: &EnvelopeDraft, target: f64, budget: Duration) -> PowStamp {
    PowSearch::new(target, budget).run(draft)
}

/// Recompute the work value of a received envelope (no search).
pub fn verify(envelope: &Envelope) -> f64 {
    work_for_nonce(&envelope.pow_data(), envelope.nonce, envelope.size(), envelope.ttl)
}

/// Work for one nonce over `pow_data`.
pub fn work_for_nonce(pow_data: &[u8], nonce: u64, size: usize, ttl: u32) -> f64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(pow_data);
    hasher.update(&nonce.to_le_bytes());
    work_from_digest(hasher.finalize().as_bytes(), size, ttl)
}

fn work_from_digest(digest: &[u8; 32], size: usize, ttl: u32) -> f64 {
    if ttl == 0 || size == 0 {
        return 0.0;
    }
    let cost = digest
        .iter()
        .fold(0.0_f64, |acc, &byte| acc * 256.0 + f64::from(byte));
    2f64.powi(256) / ((cost + 1.0) * size as f64 * f64::from(ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Topic;

    fn draft(ttl: u32) -> EnvelopeDraft {
        EnvelopeDraft {
            topic: Topic([0xAA, 0xBB, 0xCC, 0xDD]),
            timestamp: 1_700_000_000,
            ttl,
            pow_target: 2.0,
            ciphertext: vec![0x5A; 240],
        }
    }

    #[test]
    fn test_stamp_meets_small_target() {
        let draft = draft(20);
        let stamp = stamp(&draft, 0.5, Duration::from_secs(10));

        assert!(stamp.met_target);
        assert!(stamp.work >= 0.5);
        let envelope = draft.seal(&stamp);
        assert_eq!(verify(&envelope), stamp.work);
    }

    #[test]
    fn test_verify_is_pure() {
        let draft = draft(20);
        let envelope = draft.clone().seal(&stamp(&draft, 0.1, Duration::from_secs(1)));
        assert_eq!(verify(&envelope), verify(&envelope));
    }

    #[test]
    fn test_more_iterations_never_worse() {
        let draft = draft(20);
        let mut previous = 0.0;
        for iterations in [1, 10, 100, 1_000, 5_000] {
            let stamp = PowSearch::new(f64::INFINITY, Duration::from_secs(60))
                .max_iterations(iterations)
                .run(&draft);
            assert_eq!(stamp.iterations, iterations);
            assert!(stamp.work >= previous);
            previous = stamp.work;
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let draft = draft(20);
        let search = PowSearch::new(f64::INFINITY, Duration::from_secs(60)).max_iterations(500);
        assert_eq!(search.run(&draft), search.run(&draft));
    }

    #[test]
    fn test_unreachable_target_returns_best_effort() {
        let draft = draft(20);
        let stamp = stamp(&draft, f64::INFINITY, Duration::from_millis(20));

        assert!(!stamp.met_target);
        assert!(stamp.iterations >= 1);
        assert!(stamp.work > 0.0);
    }

    #[test]
    fn test_zero_budget_still_evaluates_one_nonce() {
        let stamp = stamp(&draft(20), f64::INFINITY, Duration::ZERO);
        assert!(stamp.iterations >= 1);
    }

    #[test]
    fn test_cancelled_search_stops() {
        let token = CancellationToken::new();
        token.cancel();

        let stamp = PowSearch::new(f64::INFINITY, Duration::from_secs(3600))
            .cancel_token(token)
            .run(&draft(20));
        assert_eq!(stamp.iterations, CHECK_INTERVAL);
    }

    #[test]
    fn test_work_monotonic_in_cost() {
        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 1;

        assert!(work_from_digest(&low, 100, 20) > work_from_digest(&high, 100, 20));
    }

    #[test]
    fn test_work_scales_with_size_and_ttl() {
        let digest = [0x10u8; 32];
        let base = work_from_digest(&digest, 100, 10);
        assert!(work_from_digest(&digest, 200, 10) < base);
        assert!(work_from_digest(&digest, 100, 20) < base);
    }

    #[test]
    fn test_zero_ttl_has_no_work() {
        assert_eq!(work_from_digest(&[0u8; 32], 100, 0), 0.0);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let (draft, stamp) = PowSearch::new(0.1, Duration::from_secs(5))
            .run_blocking(draft(20))
            .await
            .unwrap();
        assert!(stamp.met_target);
        assert_eq!(verify(&draft.seal(&stamp)), stamp.work);
    }
}

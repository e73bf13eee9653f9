//! Cold-storage reactivation retry protocol.
//!
//! Some providers park files in cold storage: a freshly requested source can
//! take tens of seconds before its metadata becomes available. The protocol
//! keeps the load alive across widening readiness windows with exponential
//! backoff, and is cancellable through a monotonic token. The token check at
//! every poll is the only cancellation point, so cancellation latency is
//! bounded by the poll interval.

use std::time::Duration;

use tokio::time::Instant;

/// Fixed readiness poll cadence.
pub(crate) const RETRY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// User-visible pause between retry exhaustion and the automatic advance.
pub(crate) const ADVANCE_AFTER_FAILURE_DELAY: Duration = Duration::from_millis(1_500);

/// Tunable retry settings (see `[retry]` in the config file).
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    /// Backoff base for attempt 1.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Readiness window granted to every attempt before its backoff delay.
    pub metadata_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_delay_ms: 18_000,
            max_retries: 5,
            metadata_timeout_ms: 10_000,
        }
    }
}

/// Backoff delay for an attempt: 0 for the first, then doubling from the
/// base up to the ceiling.
pub(crate) fn backoff_delay_ms(config: &RetryConfig, attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms)
}

/// Outcome of one readiness poll.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PollVerdict {
    /// The poll belongs to a superseded sequence; nothing happened.
    Cancelled,
    /// The source became ready; the sequence is over.
    Succeeded { attempt: u32 },
    /// Still inside the current attempt's window.
    KeepWaiting,
    /// Window expired; a new attempt (1-based internal counter) started.
    NextAttempt { attempt: u32, max_retries: u32 },
    /// All attempts exhausted; the sequence is over.
    Exhausted,
}

struct RetrySequence {
    retry_id: u64,
    attempt: u32,
    deadline: Instant,
}

/// Owns the single active retry sequence and the cancellation token.
pub(crate) struct RetryProtocol {
    config: RetryConfig,
    token: u64,
    active: Option<RetrySequence>,
}

impl RetryProtocol {
    pub(crate) fn new(config: RetryConfig) -> Self {
        Self {
            config,
            token: 0,
            active: None,
        }
    }

    /// Begin a fresh sequence, invalidating every outstanding poll of the
    /// previous one. Returns the new token.
    pub(crate) fn start_sequence(&mut self, now: Instant) -> u64 {
        self.token += 1;
        let retry_id = self.token;
        let deadline = now + Duration::from_millis(self.config.metadata_timeout_ms);
        self.active = Some(RetrySequence {
            retry_id,
            attempt: 0,
            deadline,
        });
        retry_id
    }

    /// Drop the active sequence and invalidate all scheduled callbacks,
    /// including a pending post-exhaustion advance.
    pub(crate) fn cancel(&mut self) {
        self.token += 1;
        self.active = None;
    }

    /// `true` while `retry_id` is the most recently issued token. Used by the
    /// delayed auto-advance so a newer load supersedes it.
    pub(crate) fn token_is_current(&self, retry_id: u64) -> bool {
        self.token == retry_id
    }

    /// Evaluate one readiness poll for the sequence identified by `retry_id`.
    ///
    /// Terminal verdicts clear the sequence synchronously; the token is left
    /// untouched on exhaustion so the follow-up advance stays valid.
    pub(crate) fn on_poll(&mut self, retry_id: u64, now: Instant, engine_ready: bool) -> PollVerdict {
        let Some(seq) = self.active.as_mut() else {
            return PollVerdict::Cancelled;
        };
        if seq.retry_id != retry_id {
            return PollVerdict::Cancelled;
        }
        if engine_ready {
            let attempt = seq.attempt;
            self.active = None;
            return PollVerdict::Succeeded { attempt };
        }
        if now < seq.deadline {
            return PollVerdict::KeepWaiting;
        }
        if seq.attempt >= self.config.max_retries {
            self.active = None;
            return PollVerdict::Exhausted;
        }
        seq.attempt += 1;
        let delay = backoff_delay_ms(&self.config, seq.attempt);
        seq.deadline =
            now + Duration::from_millis(self.config.metadata_timeout_ms.saturating_add(delay));
        PollVerdict::NextAttempt {
            attempt: seq.attempt,
            max_retries: self.config.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig::default()
    }

    #[test]
    fn backoff_schedule_matches_doubling_with_ceiling() {
        let cfg = config();
        let delays: Vec<u64> = (0..=5).map(|k| backoff_delay_ms(&cfg, k)).collect();
        assert_eq!(delays, vec![0, 2_000, 4_000, 8_000, 16_000, 18_000]);
    }

    #[test]
    fn backoff_saturates_for_large_attempts() {
        let cfg = config();
        assert_eq!(backoff_delay_ms(&cfg, 40), cfg.max_delay_ms);
        assert_eq!(backoff_delay_ms(&cfg, 200), cfg.max_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_succeeds_when_engine_becomes_ready() {
        let mut retry = RetryProtocol::new(config());
        let now = Instant::now();
        let id = retry.start_sequence(now);

        assert_eq!(
            retry.on_poll(id, now + Duration::from_millis(500), false),
            PollVerdict::KeepWaiting
        );
        assert_eq!(
            retry.on_poll(id, now + Duration::from_millis(1_000), true),
            PollVerdict::Succeeded { attempt: 0 }
        );
        // Terminal success is reported exactly once.
        assert_eq!(
            retry.on_poll(id, now + Duration::from_millis(1_500), true),
            PollVerdict::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn windows_widen_per_attempt_until_exhaustion() {
        let mut retry = RetryProtocol::new(config());
        let base = Instant::now();
        let id = retry.start_sequence(base);

        // Window ends per attempt: 10s, then +12s, +14s, +18s, +26s, +28s.
        let expiries = [10_000u64, 22_000, 36_000, 54_000, 80_000, 108_000];
        for (i, at) in expiries.iter().take(5).enumerate() {
            let verdict = retry.on_poll(id, base + Duration::from_millis(*at), false);
            assert_eq!(
                verdict,
                PollVerdict::NextAttempt {
                    attempt: i as u32 + 1,
                    max_retries: 5
                }
            );
        }
        assert_eq!(
            retry.on_poll(id, base + Duration::from_millis(108_000), false),
            PollVerdict::Exhausted
        );
        // Cleared synchronously; later polls are no-ops.
        assert_eq!(
            retry.on_poll(id, base + Duration::from_millis(109_000), false),
            PollVerdict::Cancelled
        );
        // The exhausted token stays valid for the delayed auto-advance.
        assert!(retry.token_is_current(id));
    }

    #[tokio::test(start_paused = true)]
    async fn new_sequence_invalidates_pending_polls_of_the_old_one() {
        let mut retry = RetryProtocol::new(config());
        let now = Instant::now();
        let first = retry.start_sequence(now);
        let second = retry.start_sequence(now + Duration::from_millis(2_000));

        assert_eq!(
            retry.on_poll(first, now + Duration::from_millis(2_500), true),
            PollVerdict::Cancelled
        );
        assert!(!retry.token_is_current(first));
        assert_eq!(
            retry.on_poll(second, now + Duration::from_millis(2_500), false),
            PollVerdict::KeepWaiting
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_invalidates_the_exhaustion_advance() {
        let mut retry = RetryProtocol::new(config());
        let id = retry.start_sequence(Instant::now());
        retry.cancel();
        assert!(!retry.token_is_current(id));
    }
}

//! Retry policy for failed page fetches.
//!
//! Given the kind of failure and how many attempts already failed, the policy
//! picks one of three outcomes:
//! - back off for `(attempt + 1) * backoff_unit` and retry with the same credential
//! - wait for a new credential and retry (no timed delay)
//! - give up and surface the error
//!
//! Attempts are bounded for every kind of failure, including credential waits.

use std::time::{Duration, Instant};

use feedsync_types::ErrorKind;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default linear backoff unit.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then retry with the same credential.
    Backoff(Duration),
    /// Wait for the next usable credential, then retry immediately.
    AwaitCredential,
    /// Stop retrying and surface the error.
    GiveUp,
}

/// Bounded, linear retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Backoff after the n-th failure (zero-based) is `(n + 1) * backoff_unit`.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    /// Decide what follows the failure of attempt number `attempt` (zero-based).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts.saturating_sub(1) || !kind.is_retryable() {
            return RetryDecision::GiveUp;
        }

        match kind {
            ErrorKind::InvalidCredential => RetryDecision::AwaitCredential,
            _ => RetryDecision::Backoff(self.backoff_unit.saturating_mul(attempt + 1)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_UNIT)
    }
}

/// Failure history of the current retry sequence.
///
/// Created on the first failure, discarded on success or when the policy
/// gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// Zero-based index of the latest failed attempt.
    pub attempt: u32,
    /// Kind of the latest failure.
    pub last_error: ErrorKind,
    /// When the first attempt of this sequence failed.
    pub started_at: Instant,
}

impl RetryContext {
    /// Start a sequence after the first failure.
    pub fn new(kind: ErrorKind, started_at: Instant) -> Self {
        Self {
            attempt: 0,
            last_error: kind,
            started_at,
        }
    }

    /// Record another failed attempt.
    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.attempt = self.attempt.saturating_add(1);
        self.last_error = kind;
    }

    /// Ask `policy` what follows the latest failure.
    pub fn decide(&self, policy: &RetryPolicy) -> RetryDecision {
        policy.decide(self.attempt, self.last_error)
    }
}

//! Bounded reconnection policy.
//!
//! A fixed number of attempts with a fixed delay between them. There is no
//! exponential backoff: the policy exists to ride out short network blips,
//! not to keep a dead session alive.

use std::time::Duration;

use crate::error::SessionError;

/// Default number of reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between a failed attempt and the next one.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after the delay.
    RetryAfter(Duration),
    /// All attempts are used up; tear the session down.
    GiveUp,
    /// The failure can never succeed on retry; tear down now.
    Fatal,
}

/// Tracks attempts and the single-attempt guard.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
    in_progress: bool,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
            in_progress: false,
        }
    }

    /// Attempts made since the last successful ready.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Claim the guard for a new attempt.
    ///
    /// Returns `false`, without counting an attempt, when one is already in
    /// flight or no attempts remain.
    pub fn begin(&mut self) -> bool {
        if self.in_progress || self.is_exhausted() {
            return false;
        }
        self.in_progress = true;
        self.attempts += 1;
        true
    }

    /// The attempt opened a socket. The counter is kept until
    /// [`reset`](Self::reset), since the handshake may still fail.
    pub fn succeeded(&mut self) {
        self.in_progress = false;
    }

    /// The attempt failed with `error`.
    pub fn failed(&mut self, error: &SessionError) -> ReconnectDecision {
        self.in_progress = false;
        if !error.is_retryable() {
            ReconnectDecision::Fatal
        } else if self.is_exhausted() {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::RetryAfter(self.delay)
        }
    }

    /// The session reached ready again; start counting from zero.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.in_progress = false;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RECONNECT_DELAY)
    }
}

//! Server error classification and the reconnect policy it drives

use crate::utils::ExponentialBackoff;
use std::fmt;
use std::time::Duration;

/// Error phrases that end the session, matched as case-insensitive prefixes
const CRITICAL_PHRASES: [&str; 4] = [
    "Unauthenticated",
    "your IP is banned",
    "IP Address currently banned",
    "Invalid job id",
];

/// Whether a server error message requires tearing the session down
pub fn is_critical_error(message: &str) -> bool {
    CRITICAL_PHRASES.iter().any(|phrase| {
        message
            .as_bytes()
            .get(..phrase.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(phrase.as_bytes()))
    })
}

/// Consecutive failure counter shared with the retry scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCount {
    /// Failed teardowns since the last successful login
    Attempts(u32),
    /// Caller disconnected; do not retry
    Halted,
}

impl FailureCount {
    /// Count one more failure; `Halted` stays halted
    pub fn increment(self) -> Self {
        match self {
            FailureCount::Attempts(n) => FailureCount::Attempts(n.saturating_add(1)),
            FailureCount::Halted => FailureCount::Halted,
        }
    }

    /// Whether automatic retry is disabled
    pub fn is_halted(&self) -> bool {
        matches!(self, FailureCount::Halted)
    }
}

impl Default for FailureCount {
    fn default() -> Self {
        FailureCount::Attempts(0)
    }
}

impl fmt::Display for FailureCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCount::Attempts(n) => write!(f, "{}", n),
            FailureCount::Halted => write!(f, "halted"),
        }
    }
}

/// Why the last session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// `disconnect()` by the caller
    Requested,
    /// Connect failure or unexpected close of the link
    Transport(String),
    /// Protocol fault with its diagnostic code
    Protocol(i32),
    /// Pool repeated the current job
    DuplicateJob(String),
    /// Login refused with a non-critical error
    Rejected(String),
    /// Server reported a critical error
    Critical(String),
    /// Connect or response deadline elapsed
    Timeout,
    /// `close()` by the caller, or a local precondition failed
    Closed,
}

impl Teardown {
    /// Whether the pool refused us outright
    pub fn is_critical(&self) -> bool {
        matches!(self, Teardown::Critical(_))
    }
}

impl fmt::Display for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Requested => write!(f, "disconnect requested"),
            Teardown::Transport(reason) => write!(f, "transport: {}", reason),
            Teardown::Protocol(code) => write!(f, "protocol fault, code {}", code),
            Teardown::DuplicateJob(id) => write!(f, "duplicate job {}", id),
            Teardown::Rejected(message) => write!(f, "login rejected: {}", message),
            Teardown::Critical(message) => write!(f, "critical pool error: {}", message),
            Teardown::Timeout => write!(f, "timeout"),
            Teardown::Closed => write!(f, "closed"),
        }
    }
}

/// Decides whether and when to reconnect after a teardown
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    retries: u32,
    max_pause: Duration,
    backoff: ExponentialBackoff,
}

impl ReconnectPolicy {
    /// `retries == 0` retries forever
    pub fn new(retries: u32, pause: Duration, max_pause: Duration) -> Self {
        Self {
            retries,
            max_pause,
            backoff: ExponentialBackoff::new(pause, max_pause, 2.0),
        }
    }

    /// Delay before the next attempt, or `None` to stay disconnected
    pub fn next_delay(&self, failures: FailureCount, teardown: &Teardown) -> Option<Duration> {
        let attempts = match failures {
            FailureCount::Halted => return None,
            FailureCount::Attempts(n) => n,
        };

        if *teardown == Teardown::Requested {
            return None;
        }

        if self.retries > 0 && attempts > self.retries {
            return None;
        }

        if teardown.is_critical() {
            return Some(self.max_pause);
        }

        Some(self.backoff.delay_for(attempts.saturating_sub(1)))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(0, Duration::from_secs(5), Duration::from_secs(60))
    }
}

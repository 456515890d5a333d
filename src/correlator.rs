//! Request correlation and submission tracking
//!
//! Sequence ids start at 1, and 1 belongs to login alone. Callbacks are
//! registered before a frame leaves, and dropped (never invoked) on teardown.

use crate::stratum::{Response, LOGIN_ID};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Callback run when the matching response arrives, with the round-trip time
pub type ResponseCallback = Box<dyn FnOnce(&Response, Duration) + Send>;

struct Pending {
    callback: ResponseCallback,
    sent: Instant,
}

/// Sequence counter plus the pending-request map
pub struct Correlator {
    sequence: i64,
    pending: HashMap<i64, Pending>,
}

impl Correlator {
    /// Fresh counter positioned at the login id
    pub fn new() -> Self {
        Self {
            sequence: LOGIN_ID,
            pending: HashMap::new(),
        }
    }

    /// Id for the login request; later ids are always greater
    pub fn login_sequence(&mut self) -> i64 {
        if self.sequence <= LOGIN_ID {
            self.sequence = LOGIN_ID + 1;
        }

        LOGIN_ID
    }

    /// Next request id, never the login id
    pub fn next_sequence(&mut self) -> i64 {
        if self.sequence <= LOGIN_ID {
            self.sequence = LOGIN_ID + 1;
        }

        let id = self.sequence;
        self.sequence += 1;
        id
    }

    /// Register a callback for `id`
    pub fn register(&mut self, id: i64, callback: ResponseCallback, now: Instant) {
        self.pending.insert(id, Pending { callback, sent: now });
    }

    /// Drop a registration without running it
    pub fn unregister(&mut self, id: i64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Take the callback matching a response, with its round-trip time
    pub fn take(&mut self, id: i64, now: Instant) -> Option<(ResponseCallback, Duration)> {
        self.pending
            .remove(&id)
            .map(|p| (p.callback, now.saturating_duration_since(p.sent)))
    }

    /// Whether `id` has a registered callback
    pub fn is_pending(&self, id: i64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget every pending callback without invoking any
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for one share submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    /// Request id of the submit
    pub seq: i64,
    /// Difficulty the share was solved against
    pub diff: u64,
    /// Difficulty the hash actually reached
    pub actual_diff: u64,
    /// Caller-assigned share id
    pub id: i64,
    /// Backend tag
    pub backend: String,
    started: Instant,
    elapsed: Duration,
}

impl SubmitResult {
    /// New entry, timed from `started`
    pub fn new(seq: i64, diff: u64, actual_diff: u64, id: i64, backend: impl Into<String>, started: Instant) -> Self {
        Self {
            seq,
            diff,
            actual_diff,
            id,
            backend: backend.into(),
            started,
            elapsed: Duration::ZERO,
        }
    }

    /// Stop the clock
    pub fn done(&mut self, now: Instant) {
        self.elapsed = now.saturating_duration_since(self.started);
    }

    /// Round-trip time, zero until [`SubmitResult::done`]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Outstanding submissions keyed by request id
#[derive(Debug, Default)]
pub struct SubmitTracker {
    results: HashMap<i64, SubmitResult>,
}

impl SubmitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission before its frame is sent
    pub fn record(&mut self, result: SubmitResult) {
        self.results.insert(result.seq, result);
    }

    /// Resolve a submission; the entry is removed regardless of outcome
    pub fn resolve(&mut self, seq: i64, now: Instant) -> Option<SubmitResult> {
        let mut result = self.results.remove(&seq)?;
        result.done(now);
        Some(result)
    }

    /// Drop an entry whose frame never left
    pub fn forget(&mut self, seq: i64) {
        self.results.remove(&seq);
    }

    pub fn contains(&self, seq: i64) -> bool {
        self.results.contains_key(&seq)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Discard everything unresolved
    pub fn clear(&mut self) {
        self.results.clear();
    }
}

use std::fmt::Debug;
use std::time::Duration;

use quanta::Instant;

use crate::identity::Identity;

/// Outcome of recording one request against an identity's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub admitted: bool,
    pub limit: u64,
    /// Requests counted in the current window, this one included.
    pub count: u64,
    /// Time until the current window closes.
    pub resets_in: Duration,
}

/// Per-identity mapping from identity to its counting window.
///
/// Stores must be `Send` and `Sync` so a single instance can be shared by every
/// request via `Arc`. Recording a request is one atomic step per identity: two
/// concurrent calls for the same identity never observe the same count.
pub trait CounterStore: Debug + Send + Sync {
    /// Counts one request for `identity` at `now` and checks it against `limit`.
    ///
    /// Rejected requests are counted too.
    fn record_and_check(&self, identity: &Identity, limit: u64, now: Instant) -> Verdict;

    /// Removes windows that started at least `idle` before `now`.
    ///
    /// Returns the number of windows removed. With `idle` of at least one window
    /// this never changes an admission outcome.
    fn evict_stale(&self, now: Instant, idle: Duration) -> usize;

    /// The fixed accounting period.
    fn window(&self) -> Duration;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single identity's accounting period.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    count: u64,
    start: Instant,
}

impl Window {
    pub(crate) fn open(now: Instant) -> Self {
        Self {
            count: 1,
            start: now,
        }
    }

    /// Counts one request, reopening the window if it has expired.
    pub(crate) fn record(&mut self, now: Instant, period: Duration) {
        if now.saturating_duration_since(self.start) < period {
            self.count = self.count.saturating_add(1);
        } else {
            *self = Self::open(now);
        }
    }

    pub(crate) fn verdict(&self, limit: u64, now: Instant, period: Duration) -> Verdict {
        Verdict {
            admitted: self.count <= limit,
            limit,
            count: self.count,
            resets_in: period.saturating_sub(now.saturating_duration_since(self.start)),
        }
    }

    pub(crate) fn is_stale(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.start) >= idle
    }
}

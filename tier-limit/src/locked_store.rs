use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Instant;

use crate::identity::Identity;
use crate::store::CounterStore;
use crate::store::Verdict;
use crate::store::Window;

/// A fixed-window counter store guarded by one global lock.
///
/// Simpler than [`crate::WindowStore`], at the cost of every identity
/// contending on the same mutex.
#[derive(Debug)]
pub struct LockedStore {
    windows: Mutex<HashMap<Identity, Window>>,
    period: Duration,
}

impl LockedStore {
    pub fn new(period: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            period,
        }
    }
}

impl CounterStore for LockedStore {
    fn record_and_check(&self, identity: &Identity, limit: u64, now: Instant) -> Verdict {
        let mut windows = self.windows.lock();
        let window = match windows.get_mut(identity) {
            Some(window) => {
                window.record(now, self.period);
                *window
            }
            None => *windows
                .entry(identity.clone())
                .or_insert_with(|| Window::open(now)),
        };
        window.verdict(limit, now, self.period)
    }

    fn evict_stale(&self, now: Instant, idle: Duration) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| !window.is_stale(now, idle));
        before - windows.len()
    }

    fn window(&self) -> Duration {
        self.period
    }

    fn len(&self) -> usize {
        self.windows.lock().len()
    }
}

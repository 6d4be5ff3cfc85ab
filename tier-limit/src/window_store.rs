use std::time::Duration;

use dashmap::DashMap;
use quanta::Instant;

use crate::identity::Identity;
use crate::store::CounterStore;
use crate::store::Verdict;
use crate::store::Window;

/// A sharded, fixed-window counter store.
///
/// Each identity's read-modify-write runs under its shard's write lock, so
/// concurrent requests for one identity are serialised while requests for
/// identities in other shards proceed in parallel.
#[derive(Debug)]
pub struct WindowStore {
    windows: DashMap<Identity, Window>,
    period: Duration,
}

impl WindowStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `period` - The duration of every identity's fixed window.
    pub fn new(period: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            period,
        }
    }
}

impl CounterStore for WindowStore {
    fn record_and_check(&self, identity: &Identity, limit: u64, now: Instant) -> Verdict {
        // Known identities avoid cloning the key.
        if let Some(mut window) = self.windows.get_mut(identity) {
            window.record(now, self.period);
            return window.verdict(limit, now, self.period);
        }

        let window = self
            .windows
            .entry(identity.clone())
            .and_modify(|window| window.record(now, self.period))
            .or_insert_with(|| Window::open(now));
        window.verdict(limit, now, self.period)
    }

    fn evict_stale(&self, now: Instant, idle: Duration) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            let stale = window.is_stale(now, idle);
            if stale {
                evicted += 1;
            }
            !stale
        });
        evicted
    }

    fn window(&self) -> Duration {
        self.period
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quanta::Clock;

    use super::*;

    const PERIOD: Duration = Duration::from_secs(3600);

    fn user(id: &str) -> Identity {
        Identity::User(id.to_string())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_actual_concurrency() {
        let capacity = 100;
        let callers = 2_000;
        let (clock, _mock) = Clock::mock();
        let now = clock.now();

        for _ in 0..20 {
            let store = Arc::new(WindowStore::new(PERIOD));
            let mut handles = vec![];

            for _ in 0..callers {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store.record_and_check(&user("hot"), capacity, now)
                }));
            }

            let results = futures::future::join_all(handles).await;
            let verdicts: Vec<Verdict> = results.into_iter().map(|r| r.unwrap()).collect();
            let admitted = verdicts.iter().filter(|v| v.admitted).count() as u64;

            // Exactly 'capacity' should pass, and every count is observed exactly once
            assert_eq!(admitted, capacity);
            let mut counts: Vec<u64> = verdicts.iter().map(|v| v.count).collect();
            counts.sort_unstable();
            assert_eq!(counts, (1..=callers).collect::<Vec<_>>());
        }
    }

    #[test]
    fn identities_are_counted_independently() {
        let (clock, _mock) = Clock::mock();
        let store = WindowStore::new(PERIOD);

        for _ in 0..3 {
            store.record_and_check(&user("a"), 3, clock.now());
        }
        assert!(!store.record_and_check(&user("a"), 3, clock.now()).admitted);
        assert!(store.record_and_check(&user("b"), 3, clock.now()).admitted);
        assert!(
            store
                .record_and_check(&Identity::Address("a".to_string()), 3, clock.now())
                .admitted
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn eviction_only_removes_stale_windows() {
        let (clock, mock) = Clock::mock();
        let store = WindowStore::new(PERIOD);

        store.record_and_check(&user("old"), 3, clock.now());
        mock.increment(PERIOD * 2);
        store.record_and_check(&user("new"), 3, clock.now());

        assert_eq!(store.evict_stale(clock.now(), PERIOD * 2), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.evict_stale(clock.now(), PERIOD * 2), 0);
    }
}

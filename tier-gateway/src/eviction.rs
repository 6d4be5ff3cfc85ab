use std::sync::Arc;
use std::time::Duration;

use tier_limit::AdmissionGate;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodically drops windows that started at least `idle` ago.
///
/// Eviction never changes an admission outcome: a dropped window would have
/// been reopened by the caller's next request anyway.
pub fn spawn_sweeper(gate: Arc<AdmissionGate>, every: Duration, idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = gate.evict_stale(idle);
            tracing::debug!(
                evicted,
                remaining = gate.store().len(),
                "swept stale windows"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use tier_limit::ClaimFields;
    use tier_limit::Clock;
    use tier_limit::CounterStore;
    use tier_limit::IdentityResolver;
    use tier_limit::TierCatalog;
    use tier_limit::WindowStore;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn sweeper_drops_only_idle_windows() {
        let (clock, time) = Clock::mock();
        let resolver =
            IdentityResolver::new(b"secret", ClaimFields::default(), TierCatalog::default())
                .unwrap();
        let store: Arc<dyn CounterStore> = Arc::new(WindowStore::new(HOUR));
        let gate = Arc::new(AdmissionGate::new(resolver, store).with_clock(clock));

        time.increment(HOUR);
        assert!(gate.admit(None, "192.0.2.1").is_continue());
        time.increment(HOUR * 3);
        assert!(gate.admit(None, "192.0.2.2").is_continue());
        assert_eq!(gate.store().len(), 2);

        let sweeper = spawn_sweeper(gate.clone(), Duration::from_secs(60), HOUR * 2);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(gate.store().len(), 1);
        assert!(!sweeper.is_finished());
        sweeper.abort();
    }
}

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use crate::Admitted;
use crate::Reason;
use crate::identity::IdentityResolver;
use crate::store::CounterStore;

/// The decision point in front of a request handler.
///
/// The gate owns its counter store for the lifetime of the process; nothing
/// else reads or mutates it. Decisions are made synchronously and in memory.
#[derive(Debug)]
pub struct AdmissionGate<S = dyn CounterStore>
where
    S: ?Sized,
{
    resolver: IdentityResolver,
    store: Arc<S>,
    clock: Clock,
}

impl<S> AdmissionGate<S>
where
    S: CounterStore + ?Sized,
{
    pub fn new(resolver: IdentityResolver, store: Arc<S>) -> Self {
        Self {
            resolver,
            store,
            clock: Clock::new(),
        }
    }

    /// Replace the wall clock, typically with one from [`Clock::mock`].
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decides whether a request may proceed, using the gate's clock.
    ///
    /// Every call is counted against the caller's window, whatever the outcome.
    ///
    /// # Rejection
    ///
    /// Breaks with [`Reason::LimitExceeded`] once the caller's tier allowance for
    /// the current window is used up.
    pub fn admit(
        &self,
        authorization: Option<&str>,
        address: &str,
    ) -> ControlFlow<Reason, Admitted> {
        self.admit_at(authorization, address, self.clock.now())
    }

    /// Decides whether a request arriving at `now` may proceed.
    pub fn admit_at(
        &self,
        authorization: Option<&str>,
        address: &str,
        now: Instant,
    ) -> ControlFlow<Reason, Admitted> {
        let (identity, tier) = self.resolver.resolve(authorization, address);
        let verdict = self.store.record_and_check(&identity, tier.limit(), now);

        if verdict.admitted {
            tracing::trace!(
                %identity,
                tier = tier.name(),
                count = verdict.count,
                limit = verdict.limit,
                "request admitted"
            );
            ControlFlow::Continue(Admitted {
                tier: tier.shared_name(),
                limit: verdict.limit,
                count: verdict.count,
            })
        } else {
            tracing::info!(
                %identity,
                tier = tier.name(),
                count = verdict.count,
                limit = verdict.limit,
                "request rejected: tier limit reached"
            );
            ControlFlow::Break(Reason::LimitExceeded {
                tier: tier.shared_name(),
                limit: verdict.limit,
                count: verdict.count,
                retry_after: verdict.resets_in,
            })
        }
    }

    /// Drops windows that started at least `idle` ago, returning how many went.
    ///
    /// `idle` is raised to the store's window length, so a window that could
    /// still reject a request is never dropped.
    pub fn evict_stale(&self, idle: Duration) -> usize {
        let idle = idle.max(self.store.window());
        self.store.evict_stale(self.clock.now(), idle)
    }
}

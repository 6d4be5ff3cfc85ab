//! # tier-limit
//!
//! `tier-limit` decides whether an inbound request may proceed, based on who is
//! calling and which service tier they belong to.
//!
//! ## Core Philosophy
//!
//! Every request is mapped to an [`Identity`] (a verified user id, or the caller's
//! network address when no valid credential is presented) and a [`Tier`] from a
//! static [`TierCatalog`]. The identity's volume is then counted in a fixed window
//! and compared with the tier's limit.
//!
//! ## Key Concepts
//!
//! * **Fail Open to Anonymous**: Malformed, expired or forged credentials never
//!   produce an error. The caller is simply treated as a `guest` keyed by address.
//! * **Fixed Window**: Counts reset once a window has fully elapsed. Bursts of twice
//!   the limit can straddle a boundary; that is the intended behaviour.
//! * **Counted Decisions**: Every check is recorded, including rejected ones.
//! * **Store Trait**: [`CounterStore`] hides the locking discipline. [`WindowStore`]
//!   shards its locks per key, [`LockedStore`] uses a single global lock.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tier_limit::AdmissionGate;
//! use tier_limit::ClaimFields;
//! use tier_limit::IdentityResolver;
//! use tier_limit::TierCatalog;
//! use tier_limit::WindowStore;
//!
//! let resolver =
//!     IdentityResolver::new(b"secret", ClaimFields::default(), TierCatalog::default()).unwrap();
//! let store = Arc::new(WindowStore::new(Duration::from_secs(3600)));
//! let gate = AdmissionGate::new(resolver, store);
//!
//! if gate.admit(None, "203.0.113.7").is_continue() {
//!     // Request allowed
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

mod gate;
mod identity;
mod locked_store;
mod store;
mod tier;
mod window_store;

pub use gate::AdmissionGate;
pub use identity::ClaimFields;
pub use identity::Identity;
pub use identity::IdentityResolver;
pub use identity::ResolverError;
pub use locked_store::LockedStore;
pub use store::CounterStore;
pub use store::Verdict;
pub use tier::CatalogError;
pub use tier::GUEST;
pub use tier::Tier;
pub use tier::TierCatalog;
pub use window_store::WindowStore;

/// Re-exported so callers can build a mock clock for [`AdmissionGate::with_clock`].
pub use quanta::Clock;
pub use quanta::Instant;

/// The default accounting period for every identity.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Details of an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub tier: Arc<str>,
    pub limit: u64,
    pub count: u64,
}

/// Reasons why a request might be rejected by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The identity has used up its tier's allowance for the current window.
    LimitExceeded {
        tier: Arc<str>,
        limit: u64,
        count: u64,
        retry_after: Duration,
    },
}

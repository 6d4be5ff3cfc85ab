use std::collections::HashMap;
use std::sync::Arc;

/// Name of the tier every unrecognised or anonymous caller falls back to.
pub const GUEST: &str = "guest";

/// Tiers whose limits must be non-decreasing, in this order, when present.
const RANKED: [&str; 3] = [GUEST, "free", "premium"];

const DEFAULT_TIERS: [(&str, u64); 3] = [(GUEST, 3), ("free", 10), ("premium", 20)];

/// Errors raised while building a [`TierCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("tier catalog must contain a `guest` tier")]
    MissingGuest,

    #[error("tier `{tier}` must allow at least one request per window")]
    ZeroLimit { tier: String },

    #[error("tier `{lower}` (limit {lower_limit}) must not exceed tier `{higher}` (limit {higher_limit})")]
    Unordered {
        lower: String,
        lower_limit: u64,
        higher: String,
        higher_limit: u64,
    },
}

/// A named service class bounding requests per window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    name: Arc<str>,
    limit: u64,
}

impl Tier {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Maximum number of requests admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// The static, process-wide set of tiers.
///
/// A catalog always holds a `guest` tier, and `guest` never allows more than any
/// other tier. When `free` and `premium` are both configured, `free` never allows
/// more than `premium`.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: HashMap<Arc<str>, Tier>,
    guest: Tier,
}

impl TierCatalog {
    /// Builds a catalog from `(name, limit)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if `guest` is missing, a limit is zero, or the
    /// limits are not ordered `guest ≤ free ≤ premium`.
    pub fn new<I, K>(tiers: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<Arc<str>>,
    {
        let mut map = HashMap::new();
        for (name, limit) in tiers {
            let name: Arc<str> = name.into();
            if limit == 0 {
                return Err(CatalogError::ZeroLimit {
                    tier: name.to_string(),
                });
            }
            map.insert(Arc::clone(&name), Tier { name, limit });
        }

        let guest = map.get(GUEST).cloned().ok_or(CatalogError::MissingGuest)?;

        if let Some(tier) = map.values().find(|tier| tier.limit < guest.limit) {
            return Err(CatalogError::Unordered {
                lower: GUEST.to_string(),
                lower_limit: guest.limit,
                higher: tier.name.to_string(),
                higher_limit: tier.limit,
            });
        }

        let ranked: Vec<&Tier> = RANKED.iter().filter_map(|name| map.get(*name)).collect();
        for pair in ranked.windows(2) {
            if pair[0].limit > pair[1].limit {
                return Err(CatalogError::Unordered {
                    lower: pair[0].name.to_string(),
                    lower_limit: pair[0].limit,
                    higher: pair[1].name.to_string(),
                    higher_limit: pair[1].limit,
                });
            }
        }

        Ok(Self { tiers: map, guest })
    }

    /// The universal fallback tier.
    pub fn guest(&self) -> &Tier {
        &self.guest
    }

    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.tiers.get(name)
    }

    /// Maps a plan label onto a tier. Absent and unknown labels map to `guest`.
    pub fn resolve(&self, label: Option<&str>) -> &Tier {
        label.and_then(|name| self.get(name)).unwrap_or(&self.guest)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        let tiers = DEFAULT_TIERS
            .iter()
            .map(|&(name, limit)| {
                let name: Arc<str> = Arc::from(name);
                (Arc::clone(&name), Tier { name, limit })
            })
            .collect::<HashMap<_, _>>();
        let guest = Tier {
            name: Arc::from(GUEST),
            limit: DEFAULT_TIERS[0].1,
        };
        Self { tiers, guest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_ordered() {
        let catalog = TierCatalog::default();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.guest().limit(), 3);
        assert_eq!(catalog.get("free").map(Tier::limit), Some(10));
        assert_eq!(catalog.get("premium").map(Tier::limit), Some(20));

        // The default must satisfy the same rules as a configured catalog.
        let rebuilt = TierCatalog::new(DEFAULT_TIERS).unwrap();
        assert_eq!(rebuilt.guest(), catalog.guest());
    }

    #[test]
    fn resolution_is_total() {
        let catalog = TierCatalog::default();
        assert_eq!(catalog.resolve(Some("premium")).name(), "premium");
        assert_eq!(catalog.resolve(Some("free")).name(), "free");
        assert_eq!(catalog.resolve(Some("enterprise")).name(), GUEST);
        assert_eq!(catalog.resolve(Some("Premium")).name(), GUEST);
        assert_eq!(catalog.resolve(Some("")).name(), GUEST);
        assert_eq!(catalog.resolve(None).name(), GUEST);
    }

    #[test]
    fn guest_is_required() {
        let err = TierCatalog::new([("free", 10), ("premium", 20)]).unwrap_err();
        assert_eq!(err, CatalogError::MissingGuest);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = TierCatalog::new([("guest", 0)]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::ZeroLimit {
                tier: "guest".to_string()
            }
        );
    }

    #[test]
    fn guest_must_be_the_lowest_tier() {
        let err = TierCatalog::new([("guest", 5), ("partner", 4)]).unwrap_err();
        assert!(matches!(err, CatalogError::Unordered { ref higher, .. } if higher == "partner"));
    }

    #[test]
    fn free_must_not_exceed_premium() {
        let err = TierCatalog::new([("guest", 3), ("free", 50), ("premium", 20)]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Unordered {
                lower: "free".to_string(),
                lower_limit: 50,
                higher: "premium".to_string(),
                higher_limit: 20,
            }
        );
    }

    #[test]
    fn legacy_catalog_with_equal_limits_is_accepted() {
        let catalog = TierCatalog::new([("guest", 3), ("free", 3), ("premium", 5)]).unwrap();
        assert_eq!(catalog.resolve(Some("free")).limit(), 3);
        assert_eq!(catalog.resolve(Some("premium")).limit(), 5);
    }
}

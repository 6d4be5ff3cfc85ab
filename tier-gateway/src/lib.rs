//! # tier-gateway
//!
//! An axum server that puts the tiered admission gate in front of its chat
//! endpoint.
//!
//! | route | behaviour |
//! |---|---|
//! | `GET /status` | `200 OK`, never limited |
//! | `GET /chat/chatboot` | admitted per caller tier, otherwise `429` |
//! | anything else | `404 Not Found` |

use std::sync::Arc;

use axum::Router;
use tier_limit::AdmissionGate;
use tier_limit::CatalogError;
use tier_limit::ClaimFields;
use tier_limit::CounterStore;
use tier_limit::IdentityResolver;
use tier_limit::LockedStore;
use tier_limit::ResolverError;
use tier_limit::WindowStore;

pub mod config;
pub mod eviction;
pub mod routes;
pub mod telemetry;

pub use crate::config::Config;
pub use crate::config::ConfigLoadError;
pub use crate::config::StoreKind;
pub use crate::config::Validate;
pub use crate::config::ValidationError;
pub use eviction::spawn_sweeper;
pub use telemetry::init_tracing;

/// Errors raised while assembling the gate from configuration.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid tier catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid credentials: {0}")]
    Resolver(#[from] ResolverError),
}

/// Build the admission gate described by `config`.
pub fn build_gate(config: &Config) -> Result<Arc<AdmissionGate>, GatewayError> {
    let catalog = config.limits.catalog()?;
    let fields = ClaimFields::new(
        &config.credentials.user_id_claim,
        &config.credentials.tier_claim,
    );
    let resolver = IdentityResolver::new(config.credentials.secret.as_bytes(), fields, catalog)?;

    let window = config.limits.window();
    let store: Arc<dyn CounterStore> = match config.limits.store {
        StoreKind::Sharded => Arc::new(WindowStore::new(window)),
        StoreKind::Locked => Arc::new(LockedStore::new(window)),
    };

    Ok(Arc::new(AdmissionGate::new(resolver, store)))
}

/// Build the router for an already constructed gate.
pub fn create_app(gate: Arc<AdmissionGate>, config: &Config) -> Router {
    routes::router(gate, config.server.request_timeout())
}

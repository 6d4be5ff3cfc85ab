use std::sync::Arc;

use tier_limit::AdmissionGate;
use tower::Layer;

use crate::service::AdmissionService;

/// Applies tiered admission control to requests.
#[derive(Debug)]
pub struct AdmissionLayer<G>
where
    G: ?Sized,
{
    gate: Arc<AdmissionGate<G>>,
}

impl<G> Clone for AdmissionLayer<G>
where
    G: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<G> AdmissionLayer<G>
where
    G: ?Sized,
{
    /// Create an AdmissionLayer sharing `gate` (and its counters) with every
    /// service it produces.
    pub fn new(gate: Arc<AdmissionGate<G>>) -> Self {
        AdmissionLayer { gate }
    }
}

impl<G, S> Layer<S> for AdmissionLayer<G>
where
    G: ?Sized,
{
    type Service = AdmissionService<G, S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, self.gate.clone())
    }
}

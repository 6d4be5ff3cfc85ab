use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use http::Request;
use tier_limit::AdmissionGate;
use tier_limit::CounterStore;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::AdmissionLayer;
use crate::GateError;

/// A ready-made admission stack for HTTP handlers.
///
/// Over-limit callers are rejected before the handler runs; nothing is queued.
///
/// ### Error Responsibilities:
/// - **RateLimited (`GateError::RateLimited`)**: The caller's tier allowance for
///   the current window is used up. Decided synchronously in `call`.
/// - **Timeout (`GateError::Timeout`)**: An admitted request's handler took
///   longer than `max_duration`.
/// - **Inner (`GateError::Inner`)**: Any other handler error.
///
/// `B` is the request body type.
pub struct ManagedAdmissionLayer<G, B>
where
    G: ?Sized,
{
    gate: Arc<AdmissionGate<G>>,
    max_duration: Duration,
    _phantom: PhantomData<fn(B)>,
}

// Deriving Clone would demand `B: Clone`, which request bodies are not.
impl<G, B> Clone for ManagedAdmissionLayer<G, B>
where
    G: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            max_duration: self.max_duration,
            _phantom: PhantomData,
        }
    }
}

impl<S, G, B> Layer<S> for ManagedAdmissionLayer<G, B>
where
    G: CounterStore + ?Sized + 'static,
    S: Service<Request<B>, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    B: Send + 'static,
{
    type Service = BoxCloneSyncService<Request<B>, S::Response, BoxError>;

    fn layer(&self, inner: S) -> Self::Service {
        // Admission is outer so rejected requests never start the handler timer.
        let svc = tower::ServiceBuilder::new()
            .map_err(|err: BoxError| {
                if err.is::<tower::timeout::error::Elapsed>() {
                    BoxError::from(GateError::Timeout)
                } else if err.is::<GateError>() {
                    err
                } else {
                    // Wrap any other inner service errors
                    Box::from(GateError::Inner(err.to_string()))
                }
            })
            .layer(AdmissionLayer::new(self.gate.clone()))
            .timeout(self.max_duration)
            .service(inner);

        BoxCloneSyncService::new(svc)
    }
}

impl<G, B> ManagedAdmissionLayer<G, B>
where
    G: CounterStore + ?Sized,
{
    pub fn new(gate: Arc<AdmissionGate<G>>, max_duration: Duration) -> Self {
        Self {
            gate,
            max_duration,
            _phantom: PhantomData,
        }
    }
}

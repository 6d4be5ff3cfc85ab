use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use http::Request;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use tier_limit::AdmissionGate;
use tier_limit::CounterStore;
use tier_limit::Reason;

use crate::error::GateError;
use crate::peer;

#[derive(Clone, Debug)]
struct AdmissionMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
}

impl AdmissionMetrics {
    fn new() -> Self {
        let meter = global::meter("admission_service");
        Self {
            admitted: meter.u64_counter("admission.admitted").build(),
            rejected: meter.u64_counter("admission.rejected").build(),
        }
    }
}

/// Runs every request through an [`AdmissionGate`] before the inner service.
///
/// Rejected requests fail immediately with [`GateError::RateLimited`] and never
/// reach the inner service.
#[derive(Debug)]
pub struct AdmissionService<G, S>
where
    G: ?Sized,
{
    inner: S,
    gate: Arc<AdmissionGate<G>>,
    instruments: AdmissionMetrics,
}

pin_project! {
    #[project = KindProj]
    enum Kind<F> {
        Admitted { #[pin] future: F },
        Rejected { error: Option<GateError> },
    }
}

pin_project! {
    /// Either the inner service's future or an immediate rejection.
    pub struct ResponseFuture<F> {
        #[pin]
        kind: Kind<F>,
    }
}

impl<F> ResponseFuture<F> {
    fn admitted(future: F) -> Self {
        Self {
            kind: Kind::Admitted { future },
        }
    }

    fn rejected(error: GateError) -> Self {
        Self {
            kind: Kind::Rejected { error: Some(error) },
        }
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Admitted { future } => future.poll(cx),
            KindProj::Rejected { error } => {
                let error = error.take().expect("future polled after completion");
                Poll::Ready(Err(Box::new(error)))
            }
        }
    }
}

// Manually implement Clone so that G need not be Clone
impl<G, S> Clone for AdmissionService<G, S>
where
    G: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            instruments: self.instruments.clone(),
        }
    }
}

impl<G, S, B> Service<Request<B>> for AdmissionService<G, S>
where
    G: CounterStore + ?Sized,
    S: Service<Request<B>, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let address = peer::client_address(&req);
        let decision = self.gate.admit(peer::authorization(&req), &address);

        match decision {
            ControlFlow::Continue(admitted) => {
                self.instruments
                    .admitted
                    .add(1, &[KeyValue::new("tier", admitted.tier.to_string())]);
                ResponseFuture::admitted(self.inner.call(req))
            }
            ControlFlow::Break(Reason::LimitExceeded {
                tier,
                limit,
                retry_after,
                ..
            }) => {
                self.instruments
                    .rejected
                    .add(1, &[KeyValue::new("tier", tier.to_string())]);
                ResponseFuture::rejected(GateError::RateLimited {
                    limit,
                    window: self.gate.store().window(),
                    retry_after,
                })
            }
        }
    }
}

impl<G, S> AdmissionService<G, S>
where
    G: ?Sized,
{
    pub fn new(inner: S, gate: Arc<AdmissionGate<G>>) -> Self {
        Self {
            inner,
            gate,
            instruments: AdmissionMetrics::new(),
        }
    }

    pub fn gate(&self) -> &Arc<AdmissionGate<G>> {
        &self.gate
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use tier_limit::AdmissionGate;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_tier::GateError;
use tower_tier::ManagedAdmissionLayer;

/// Build the gateway router.
///
/// Only `/chat` routes pass through the admission gate; `/status` and
/// unmatched paths are never counted.
pub fn router(gate: Arc<AdmissionGate>, request_timeout: Duration) -> Router {
    let admission = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_gate_error))
        .layer(ManagedAdmissionLayer::<_, Body>::new(gate, request_timeout))
        // Route is infallible; the managed stack expects BoxError.
        .map_err(BoxError::from);

    let chat = Router::new()
        .route("/chatboot", get(chatboot))
        .route_layer(admission);

    Router::new()
        .route("/status", get(status))
        .nest("/chat", chat)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn status() -> &'static str {
    "OK"
}

async fn chatboot() -> &'static str {
    tracing::debug!("chat handler");
    "chatboot response"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn handle_gate_error(err: BoxError) -> Response {
    match err.downcast::<GateError>() {
        Ok(gate_err) => (*gate_err).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "unhandled middleware error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
        }
    }
}

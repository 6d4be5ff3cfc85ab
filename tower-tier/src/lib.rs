//! # Tower Tier
//!
//! `tower-tier` puts a tiered [`tier_limit::AdmissionGate`] in front of any
//! [Tower](https://github.com/tower-rs/tower) HTTP service.
//!
//! Each request's `Authorization` header and peer address are handed to the gate.
//! Admitted requests proceed to the inner service. Rejected requests fail at once
//! with [`GateError::RateLimited`], carrying the tier's limit and a retry hint.
//!
//! ## The Managed Stack
//! [`ManagedAdmissionLayer`] is a pre-composed stack for production handlers:
//!
//! 1. **Admission**: Rejects over-limit callers before the handler starts.
//! 2. **Timeouts**: Fails admitted requests with `GateError::Timeout` if the handler
//!    exceeds a defined duration.
//! 3. **Error Mapping**: Converts internal Tower errors (like
//!    `tower::timeout::error::Elapsed`) into a unified, cloneable [`GateError`] domain.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`GateError`] (429, 408, 500) and reads peer
//!   addresses from axum's `ConnectInfo<SocketAddr>`.

mod error;
mod layer;
mod managed_layer;
mod peer;
mod service;


pub use error::GateError;
pub use layer::AdmissionLayer;
pub use managed_layer::ManagedAdmissionLayer;
pub use peer::UNKNOWN_ADDRESS;
pub use peer::client_address;
pub use service::AdmissionService;
pub use service::ResponseFuture;

//! Liveness endpoint.
//!
//! `GET /health` answers as long as the process is serving requests. It does
//! not touch the database, so load balancers keep routing while Postgres is
//! briefly unavailable.

use axum::Json;
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Crate version of the running build.
    pub version: &'static str,
}

/// `GET /health`
///
/// ```json
/// { "status": "ok", "version": "0.1.0" }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

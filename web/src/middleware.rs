//! Request tracing.
//!
//! Every request gets an `X-Correlation-ID` (the client's, or a fresh
//! UUID), runs inside an `http_request` span carrying that id, and returns
//! the id in the response headers so gateway deliveries can be matched to
//! log lines.

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request},
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Wrap `router` with correlation ids and per-request tracing spans.
///
/// ```ignore
/// let app = with_request_tracing(Router::new().route("/health", get(health_check)));
/// ```
pub fn with_request_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let header = HeaderName::from_static(CORRELATION_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(header.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let correlation_id = request
                    .headers()
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    correlation_id = %correlation_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }))
            .layer(PropagateRequestIdLayer::new(header)),
    )
}

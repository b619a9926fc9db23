//! Router configuration.

use super::state::AppState;
use crate::api::{admin, bookings, webhooks};
use axum::{
    Router,
    routing::{get, post, put},
};
use tutorhub_web::{handlers::health_check, with_request_tracing};

/// Build the complete router.
///
/// `/health` needs no authentication; booking routes need a bearer session;
/// webhook routes authenticate through gateway signatures.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Participant endpoints
        .route("/bookings/:id/status", put(bookings::update_status))
        .route("/bookings/:id/cancel", post(bookings::cancel))
        .route("/bookings/:id/payment", get(bookings::payment))
        // Operator endpoints
        .route("/admin/bookings/fix", post(admin::fix_booking))
        // Gateway webhooks
        .route("/webhooks/stripe", post(webhooks::stripe))
        .route("/webhooks/flutterwave", post(webhooks::flutterwave))
        .route("/webhooks/paystack", post(webhooks::paystack));

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .with_state(state);

    with_request_tracing(router)
}

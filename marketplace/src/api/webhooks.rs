//! Gateway webhook endpoints.
//!
//! Bodies are taken as raw bytes: signatures cover the exact bytes sent.
//! A delivery is acknowledged with `{"received": true}` once it has been
//! applied, ignored, or parked as unmatched. Signature failures answer 400;
//! storage and upstream failures answer 5xx so the gateway redelivers.

use crate::gateways::PaymentGateway;
use crate::server::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use std::sync::Arc;
use tutorhub_web::{AppError, WebResult};

/// Acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    /// Always `true`
    pub received: bool,
}

async fn receive(
    state: &AppState,
    gateway: Option<&Arc<dyn PaymentGateway>>,
    name: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> WebResult<Json<WebhookAck>> {
    let Some(gateway) = gateway else {
        tracing::warn!(gateway = name, "Webhook received for a gateway that is not configured");
        return Err(AppError::unavailable(format!("{name} webhooks are not configured")));
    };

    state
        .bookings
        .handle_webhook(gateway.as_ref(), body, headers)
        .await?;
    Ok(Json(WebhookAck { received: true }))
}

/// `POST /api/webhooks/stripe`
///
/// # Errors
///
/// 400 for a bad signature, 503 when Stripe is not configured or the
/// booking is busy, 500 on storage failure.
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<WebhookAck>> {
    receive(&state, state.gateways.stripe.as_ref(), "stripe", &headers, &body).await
}

/// `POST /api/webhooks/flutterwave`
///
/// # Errors
///
/// 400 for a bad `verif-hash`, 502 when verification against the API
/// fails, 503 when Flutterwave is not configured or the booking is busy.
pub async fn flutterwave(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<WebhookAck>> {
    receive(
        &state,
        state.gateways.flutterwave.as_ref(),
        "flutterwave",
        &headers,
        &body,
    )
    .await
}

/// `POST /api/webhooks/paystack`
///
/// # Errors
///
/// 400 for a bad signature, 502 when verification against the API fails,
/// 503 when Paystack is not configured or the booking is busy.
pub async fn paystack(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<WebhookAck>> {
    receive(&state, state.gateways.paystack.as_ref(), "paystack", &headers, &body).await
}

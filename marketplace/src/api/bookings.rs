//! Participant-facing booking endpoints.

use super::{booking_id, json_body};
use crate::app::PaymentVerification;
use crate::auth::SessionUser;
use crate::server::state::AppState;
use crate::types::{Booking, BookingStatus};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use serde::Deserialize;
use tutorhub_web::WebResult;
use uuid::Uuid;

/// Body of `PUT /api/bookings/:id/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// Requested status
    pub status: BookingStatus,
}

/// Body of `POST /api/bookings/:id/cancel`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Passed on to the student
    #[serde(default)]
    pub reason: Option<String>,
}

/// `PUT /api/bookings/:id/status`
///
/// # Errors
///
/// 401 without a session or for non-participants, 400 for an illegal
/// transition, 403 when the caller's role may not make it, 404 for an
/// unknown booking.
pub async fn update_status(
    State(state): State<AppState>,
    SessionUser(actor): SessionUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> WebResult<Json<Booking>> {
    let booking_id = booking_id(path)?;
    let request = json_body(body)?;

    let booking = state
        .bookings
        .update_status(actor, booking_id, request.status)
        .await?;
    Ok(Json(booking))
}

/// `POST /api/bookings/:id/cancel`
///
/// # Errors
///
/// 401 unless the caller is the booking's tutor, 400 for a closed booking
/// or a malformed body, 404 for an unknown booking.
pub async fn cancel(
    State(state): State<AppState>,
    SessionUser(actor): SessionUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> WebResult<Json<Booking>> {
    let booking_id = booking_id(path)?;
    // No JSON body at all means no reason; a malformed one is still rejected.
    let request = match body {
        Err(JsonRejection::MissingJsonContentType(_)) => CancelRequest::default(),
        body => json_body(body)?,
    };

    let booking = state
        .bookings
        .tutor_cancel(actor, booking_id, request.reason)
        .await?;
    Ok(Json(booking))
}

/// `GET /api/bookings/:id/payment`
///
/// # Errors
///
/// 401 unless the caller is a participant or an admin, 404 for an unknown
/// booking.
pub async fn payment(
    State(state): State<AppState>,
    SessionUser(actor): SessionUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> WebResult<Json<PaymentVerification>> {
    let booking_id = booking_id(path)?;
    let verification = state.bookings.payment_verification(actor, booking_id).await?;
    Ok(Json(verification))
}

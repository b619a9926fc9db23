//! Operator endpoints.

use super::json_body;
use crate::auth::RequireAdmin;
use crate::server::state::AppState;
use crate::types::{Booking, BookingId};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use tutorhub_web::WebResult;

/// Body of `POST /api/admin/bookings/fix`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixBookingRequest {
    /// Booking to promote
    pub booking_id: BookingId,
}

/// `POST /api/admin/bookings/fix`
///
/// Promotes a booking whose charge was recorded but which never left
/// PENDING.
///
/// # Errors
///
/// 401 for non-admins, 400 when the booking is not PENDING with a recorded
/// payment, 404 for an unknown booking.
pub async fn fix_booking(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Result<Json<FixBookingRequest>, JsonRejection>,
) -> WebResult<Json<Booking>> {
    let request = json_body(body)?;
    let booking = state.bookings.admin_fix(admin, request.booking_id).await?;
    Ok(Json(booking))
}

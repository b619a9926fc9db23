//! HTTP handlers.
//!
//! - `PUT  /api/bookings/:id/status` - participant status change
//! - `POST /api/bookings/:id/cancel` - tutor cancellation
//! - `GET  /api/bookings/:id/payment` - payment verification
//! - `POST /api/admin/bookings/fix` - promote a paid PENDING booking
//! - `POST /api/webhooks/{stripe,flutterwave,paystack}` - gateway webhooks

use crate::error::BookingError;
use crate::types::BookingId;
use axum::{
    Json,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
};
use tutorhub_web::{AppError, WebResult};
use uuid::Uuid;

pub mod admin;
pub mod bookings;
pub mod webhooks;

/// Booking id from the path, with a JSON 400 for malformed ids.
fn booking_id(path: Result<Path<Uuid>, PathRejection>) -> WebResult<BookingId> {
    let Path(id) = path.map_err(|rejection| {
        AppError::bad_request(format!("Invalid booking id: {}", rejection.body_text()))
    })?;
    Ok(BookingId::from_uuid(id))
}

/// JSON body, with a JSON 400 for missing or malformed fields.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> WebResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| BookingError::Validation(rejection.body_text()).into())
}

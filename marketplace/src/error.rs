//! Booking errors and their HTTP mapping.

use crate::types::{BookingId, BookingStatus};
use axum::http::StatusCode;
use tutorhub_web::AppError;

/// Why a booking operation was refused or failed.
///
/// `Clone + PartialEq` so the reducer can keep the last one in its state
/// and tests can compare it directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    /// No valid session
    #[error("Authentication required")]
    Unauthorized,

    /// Caller is neither the student nor the tutor of the booking
    #[error("Only the booking's student or tutor can change it")]
    NotParticipant,

    /// Caller is not the booking's tutor
    #[error("Only the booking's tutor can cancel it")]
    NotTutor,

    /// Caller lacks an operator role
    #[error("Admin privileges required")]
    AdminRequired,

    /// Participant, but the role may not perform this transition
    #[error("{0}")]
    Forbidden(String),

    /// Booking does not exist
    #[error("Booking with id {0} not found")]
    NotFound(BookingId),

    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Target status is not reachable from the current one
    #[error("Cannot change booking status from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },

    /// Booking is COMPLETED or CANCELLED
    #[error("Booking is already {0} and can no longer change")]
    TerminalState(BookingStatus),

    /// Admin fix needs PENDING with a recorded payment
    #[error("Booking is not eligible for fix: it must be PENDING with a recorded payment")]
    NotEligibleForFix,

    /// Webhook signature did not verify
    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    /// Commit kept losing to concurrent writers
    #[error("Booking is being updated concurrently, please retry")]
    Busy,

    /// Upstream gateway failed or rejected a verification call
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Database failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Unauthorized => Self::unauthorized(message),
            BookingError::NotParticipant => {
                Self::new(StatusCode::UNAUTHORIZED, "NOT_PARTICIPANT", message)
            },
            BookingError::NotTutor => Self::new(StatusCode::UNAUTHORIZED, "NOT_TUTOR", message),
            BookingError::AdminRequired => {
                Self::new(StatusCode::UNAUTHORIZED, "ADMIN_REQUIRED", message)
            },
            BookingError::Forbidden(_) => Self::forbidden(message),
            BookingError::NotFound(id) => Self::not_found("Booking", id),
            BookingError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            },
            BookingError::InvalidTransition { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_TRANSITION", message)
            },
            BookingError::TerminalState(_) => {
                Self::new(StatusCode::BAD_REQUEST, "TERMINAL_STATE", message)
            },
            BookingError::NotEligibleForFix => {
                Self::new(StatusCode::BAD_REQUEST, "NOT_ELIGIBLE_FOR_FIX", message)
            },
            BookingError::Signature(_) => Self::invalid_signature(message),
            BookingError::Busy => Self::unavailable(message),
            BookingError::Gateway(_) => Self::bad_gateway(message),
            BookingError::Storage(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::anyhow!(message))
            },
        }
    }
}

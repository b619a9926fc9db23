//! Session extractors.
//!
//! ```rust,ignore
//! async fn update(session: SessionUser, ...) -> WebResult<Json<Booking>> { ... }
//! async fn fix(admin: RequireAdmin, ...) -> WebResult<Json<Booking>> { ... }
//! ```

use crate::error::BookingError;
use crate::server::state::AppState;
use crate::types::Actor;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tutorhub_web::{AppError, BearerToken};

/// Caller with a valid, unexpired session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let actor = state
            .sessions
            .resolve(&token)
            .await
            .map_err(BookingError::from)?
            .ok_or(BookingError::Unauthorized)?;

        tracing::Span::current().record("user_id", tracing::field::display(actor.user_id));
        Ok(Self(actor))
    }
}

/// Caller whose session belongs to an `ADMIN` or `SUPER_ADMIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequireAdmin(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let SessionUser(actor) = SessionUser::from_request_parts(parts, state).await?;
        if !actor.role.is_admin() {
            tracing::warn!(user_id = %actor.user_id, role = actor.role.as_str(), "Admin route refused");
            return Err(BookingError::AdminRequired.into());
        }
        Ok(Self(actor))
    }
}

//! Axum integration for TutorHub services.
//!
//! The HTTP layer is a thin imperative shell: handlers extract a typed
//! request, hand it to a service that runs the reducer, and map the result
//! (or the domain error) to a response.
//!
//! - [`AppError`]: status + machine-readable code + message, rendered as JSON
//! - [`BearerToken`], [`CorrelationId`]: request extractors
//! - [`with_request_tracing`]: correlation ids and one tracing span per request
//! - [`handlers::health`]: liveness endpoint

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, with_request_tracing};

/// Result alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

//! Application layer: runs booking commands and executes their effects.

pub mod effects;
pub mod service;

pub use service::{BookingService, ChargeOutcome, PaymentVerification, WebhookOutcome};

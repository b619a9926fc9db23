//! # TutorHub marketplace
//!
//! Booking lifecycle and payment reconciliation for a tutoring marketplace.
//!
//! A booking moves `PENDING → CONFIRMED → IN_PROGRESS → COMPLETED`, or to
//! `CANCELLED` from any open state. Three independent triggers drive it:
//!
//! - participants (student or tutor) asking for a status change
//! - payment gateways (Stripe, Flutterwave, Paystack) reporting a charge
//!   through signed webhooks
//! - operators promoting a booking whose charge was recorded but which never
//!   left `PENDING`
//!
//! # Architecture
//!
//! ```text
//!  HTTP (api/)  ──►  BookingService (app/)  ──►  BookingReducer (aggregates/)
//!                         │        ▲                    │
//!                         ▼        │                    ▼
//!                   BookingStore (store/)        Effects: notifications
//! ```
//!
//! The reducer is pure: it validates the command, applies events to an
//! in-memory [`aggregates::BookingState`] and describes notifications as
//! effects. The service loads state, commits the result with an optimistic
//! version check (retrying lost races), and runs the effects afterwards.
//! Webhook redelivery is idempotent: the reducer finds its own earlier
//! payment record and does nothing, and a unique index on PAID references
//! backs that up in the database.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregates;
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateways;
pub mod metrics;
pub mod notifications;
pub mod server;
pub mod store;
pub mod types;

pub use app::{BookingService, ChargeOutcome, PaymentVerification, WebhookOutcome};
pub use config::Config;
pub use error::BookingError;
pub use server::{AppState, Gateways, build_router};

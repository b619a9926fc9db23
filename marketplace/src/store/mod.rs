//! Persistence for bookings, payments and sessions.
//!
//! Writes go through [`BookingStore::commit`], which applies a booking
//! update and its new payment records as one unit and only if the booking
//! still has the version the reducer started from.

use crate::error::BookingError;
use crate::types::{Actor, Booking, BookingId, Money, Payment, PaymentMethod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryBookingStore, InMemorySessionStore};
pub use postgres::{PostgresBookingStore, PostgresSessionStore};

/// Errors from a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another writer committed first
    #[error("booking {0} was modified concurrently")]
    Conflict(BookingId),

    /// The `(method, reference)` pair already has a PAID record
    #[error("{method} payment {reference} is already recorded as paid")]
    DuplicatePayment {
        /// Gateway
        method: PaymentMethod,
        /// Gateway transaction reference
        reference: String,
    },

    /// Any other database failure
    #[error("database error: {0}")]
    Database(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) | StoreError::DuplicatePayment { .. } => Self::Busy,
            StoreError::Database(message) => Self::Storage(message),
        }
    }
}

/// A booking as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSnapshot {
    /// The booking row
    pub booking: Booking,
    /// Its payments, oldest first
    pub payments: Vec<Payment>,
}

/// Changes produced by one reducer run.
#[derive(Debug, Clone)]
pub struct BookingCommit {
    /// Booking after the change
    pub booking: Booking,
    /// Version the change was computed against
    pub expected_version: i64,
    /// Payment records to insert
    pub new_payments: Vec<Payment>,
}

/// A verified gateway event that matched no booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedPaymentEvent {
    /// Reporting gateway
    pub gateway: PaymentMethod,
    /// Gateway transaction reference
    pub reference: String,
    /// Booking id from the event metadata, if any
    pub booking_id: Option<BookingId>,
    /// Reported amount
    pub amount: Money,
    /// Whether the gateway reported success
    pub succeeded: bool,
    /// When the webhook arrived
    pub received_at: DateTime<Utc>,
}

/// Booking and payment persistence.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Load a booking and its payments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    async fn load(&self, id: BookingId) -> Result<Option<BookingSnapshot>, StoreError>;

    /// Find the booking a gateway reference belongs to, either through
    /// `bookings.payment_reference` or an existing payment record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    async fn find_by_payment_reference(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError>;

    /// Booking holding the PAID record for a gateway transaction, whichever
    /// booking that is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    async fn find_paid_payment(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError>;

    /// Insert `new_payments` and update the booking atomically.
    ///
    /// Returns the booking with its bumped version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] when the stored version differs from `expected_version`
    /// - [`StoreError::DuplicatePayment`] when a PAID record for the same reference exists
    /// - [`StoreError::Database`] on any other failure
    async fn commit(&self, commit: BookingCommit) -> Result<Booking, StoreError>;

    /// Keep an unmatched gateway event for operator follow-up.
    ///
    /// Events are unique per `(gateway, reference, succeeded)`. Returns
    /// `false` when the event was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    async fn record_unmatched(&self, event: UnmatchedPaymentEvent) -> Result<bool, StoreError>;
}

/// Resolves bearer tokens to actors.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The actor owning `token`, or `None` for unknown or expired sessions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on storage failure.
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, StoreError>;
}

/// Tokens are stored as lowercase hex SHA-256 digests.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

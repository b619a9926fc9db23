//! In-memory stores for tests and local runs.
//!
//! Same contract as the Postgres stores: commits check the booking version
//! and the PAID-reference uniqueness under one lock.

use super::{
    BookingCommit, BookingSnapshot, BookingStore, SessionStore, StoreError, UnmatchedPaymentEvent,
    hash_token,
};
use crate::types::{Actor, Booking, BookingId, Payment, PaymentMethod, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    bookings: HashMap<BookingId, Booking>,
    payments: Vec<Payment>,
    unmatched: Vec<UnmatchedPaymentEvent>,
}

/// Bookings and payments held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    tables: Mutex<Tables>,
}

impl InMemoryBookingStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a booking.
    pub async fn insert(&self, booking: Booking) {
        self.tables.lock().await.bookings.insert(booking.id, booking);
    }

    /// Current copy of a booking.
    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.tables.lock().await.bookings.get(&id).cloned()
    }

    /// Payments recorded for a booking, oldest first.
    pub async fn payments_for(&self, id: BookingId) -> Vec<Payment> {
        self.tables
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| p.booking_id == id)
            .cloned()
            .collect()
    }

    /// Unmatched gateway events recorded so far.
    pub async fn unmatched(&self) -> Vec<UnmatchedPaymentEvent> {
        self.tables.lock().await.unmatched.clone()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn load(&self, id: BookingId) -> Result<Option<BookingSnapshot>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.bookings.get(&id).map(|booking| BookingSnapshot {
            booking: booking.clone(),
            payments: tables
                .payments
                .iter()
                .filter(|p| p.booking_id == id)
                .cloned()
                .collect(),
        }))
    }

    async fn find_by_payment_reference(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError> {
        let tables = self.tables.lock().await;
        let from_booking = tables
            .bookings
            .values()
            .find(|b| b.payment_reference.as_deref() == Some(reference))
            .map(|b| b.id);
        let from_payment = || {
            tables
                .payments
                .iter()
                .find(|p| p.method == method && p.reference == reference)
                .map(|p| p.booking_id)
        };
        Ok(from_booking.or_else(from_payment))
    }

    async fn find_paid_payment(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| {
                p.status == PaymentStatus::Paid && p.method == method && p.reference == reference
            })
            .map(|p| p.booking_id))
    }

    async fn commit(&self, commit: BookingCommit) -> Result<Booking, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = commit.booking.id;

        let current = tables
            .bookings
            .get(&id)
            .ok_or_else(|| StoreError::Database(format!("booking {id} does not exist")))?;
        if current.version != commit.expected_version {
            return Err(StoreError::Conflict(id));
        }

        for payment in &commit.new_payments {
            let duplicate = payment.status == PaymentStatus::Paid
                && tables.payments.iter().any(|p| {
                    p.status == PaymentStatus::Paid
                        && p.method == payment.method
                        && p.reference == payment.reference
                });
            if duplicate {
                return Err(StoreError::DuplicatePayment {
                    method: payment.method,
                    reference: payment.reference.clone(),
                });
            }
        }

        tables.payments.extend(commit.new_payments);
        let mut booking = commit.booking;
        booking.version = commit.expected_version + 1;
        tables.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn record_unmatched(&self, event: UnmatchedPaymentEvent) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let known = tables.unmatched.iter().any(|e| {
            e.gateway == event.gateway
                && e.reference == event.reference
                && e.succeeded == event.succeeded
        });
        if !known {
            tables.unmatched.push(event);
        }
        Ok(!known)
    }
}

/// Sessions held in process memory, keyed by token hash.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, (Actor, DateTime<Utc>)>>,
}

impl InMemorySessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` for `actor` until `expires_at`.
    pub async fn insert(&self, token: &str, actor: Actor, expires_at: DateTime<Utc>) {
        self.sessions
            .lock()
            .await
            .insert(hash_token(token), (actor, expires_at));
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&hash_token(token))
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(actor, _)| *actor))
    }
}

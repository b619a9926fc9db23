//! `PostgreSQL` stores.
//!
//! One process-wide pool is created in `main` and shared through `Arc`.

use super::{
    BookingCommit, BookingSnapshot, BookingStore, SessionStore, StoreError, UnmatchedPaymentEvent,
    hash_token,
};
use crate::types::{
    Actor, Booking, BookingId, Money, Payment, PaymentId, PaymentMethod, PaymentStatus, Role,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

type BookingRow = (
    Uuid,
    Uuid,
    Uuid,
    DateTime<Utc>,
    String,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
    bool,
    i64,
);

type PaymentRow = (Uuid, Uuid, Uuid, i64, String, String, String, String, DateTime<Utc>);

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Database(format!("corrupt row: {e}")))
}

fn booking_from_row(row: BookingRow) -> Result<Booking, StoreError> {
    let (
        id,
        student_id,
        tutor_id,
        scheduled_at,
        status,
        paid_at,
        payment_method,
        payment_reference,
        is_instant,
        version,
    ) = row;

    Ok(Booking {
        id: BookingId::from_uuid(id),
        student_id: UserId::from_uuid(student_id),
        tutor_id: UserId::from_uuid(tutor_id),
        scheduled_at,
        status: parse(&status)?,
        paid_at,
        payment_method: payment_method
            .as_deref()
            .map(parse::<PaymentMethod>)
            .transpose()?,
        payment_reference,
        is_instant,
        version,
    })
}

fn payment_from_row(row: PaymentRow) -> Result<Payment, StoreError> {
    let (id, user_id, booking_id, amount_minor, currency, status, method, reference, created_at) =
        row;

    Ok(Payment {
        id: PaymentId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        booking_id: BookingId::from_uuid(booking_id),
        amount: Money::new(amount_minor, &currency),
        status: parse(&status)?,
        method: parse(&method)?,
        reference,
        created_at,
    })
}

fn database(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

/// Bookings and payments in `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: Arc<PgPool>,
}

impl PostgresBookingStore {
    /// Use the shared pool.
    #[must_use]
    pub const fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Insert a booking row. Booking creation lives elsewhere; this seeds
    /// test data and local fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bookings (id, student_id, tutor_id, scheduled_at, status, paid_at,
                                   payment_method, payment_reference, is_instant, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.student_id.as_uuid())
        .bind(booking.tutor_id.as_uuid())
        .bind(booking.scheduled_at)
        .bind(booking.status.as_str())
        .bind(booking.paid_at)
        .bind(booking.payment_method.map(PaymentMethod::as_str))
        .bind(booking.payment_reference.as_deref())
        .bind(booking.is_instant)
        .bind(booking.version)
        .execute(self.pool.as_ref())
        .await
        .map_err(database("Failed to insert booking"))?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn load(&self, id: BookingId) -> Result<Option<BookingSnapshot>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT id, student_id, tutor_id, scheduled_at, status, paid_at,
                    payment_method, payment_reference, is_instant, version
             FROM bookings
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(database("Failed to load booking"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payment_rows: Vec<PaymentRow> = sqlx::query_as(
            "SELECT id, user_id, booking_id, amount_minor, currency, status, method, reference,
                    created_at
             FROM payments
             WHERE booking_id = $1
             ORDER BY created_at, id",
        )
        .bind(id.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(database("Failed to load payments"))?;

        Ok(Some(BookingSnapshot {
            booking: booking_from_row(row)?,
            payments: payment_rows
                .into_iter()
                .map(payment_from_row)
                .collect::<Result<_, _>>()?,
        }))
    }

    async fn find_by_payment_reference(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bookings WHERE payment_reference = $1
             UNION ALL
             SELECT booking_id FROM payments WHERE method = $2 AND reference = $1
             LIMIT 1",
        )
        .bind(reference)
        .bind(method.as_str())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(database("Failed to look up payment reference"))?;

        Ok(row.map(|(id,)| BookingId::from_uuid(id)))
    }

    async fn find_paid_payment(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Option<BookingId>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT booking_id FROM payments
             WHERE method = $1 AND reference = $2 AND status = 'PAID'",
        )
        .bind(method.as_str())
        .bind(reference)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(database("Failed to look up paid payment"))?;

        Ok(row.map(|(id,)| BookingId::from_uuid(id)))
    }

    async fn commit(&self, commit: BookingCommit) -> Result<Booking, StoreError> {
        let BookingCommit {
            mut booking,
            expected_version,
            new_payments,
        } = commit;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(database("Failed to begin transaction"))?;

        for payment in &new_payments {
            let inserted = sqlx::query(
                "INSERT INTO payments (id, user_id, booking_id, amount_minor, currency, status,
                                       method, reference, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(payment.id.as_uuid())
            .bind(payment.user_id.as_uuid())
            .bind(payment.booking_id.as_uuid())
            .bind(payment.amount.amount_minor)
            .bind(&payment.amount.currency)
            .bind(payment.status.as_str())
            .bind(payment.method.as_str())
            .bind(&payment.reference)
            .bind(payment.created_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {},
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    return Err(StoreError::DuplicatePayment {
                        method: payment.method,
                        reference: payment.reference.clone(),
                    });
                },
                Err(e) => return Err(database("Failed to insert payment")(e)),
            }
        }

        let version: Option<(i64,)> = sqlx::query_as(
            "UPDATE bookings
             SET status = $1, paid_at = $2, payment_method = $3, payment_reference = $4,
                 version = version + 1, updated_at = now()
             WHERE id = $5 AND version = $6
             RETURNING version",
        )
        .bind(booking.status.as_str())
        .bind(booking.paid_at)
        .bind(booking.payment_method.map(PaymentMethod::as_str))
        .bind(booking.payment_reference.as_deref())
        .bind(booking.id.as_uuid())
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(database("Failed to update booking"))?;

        // Dropping `tx` rolls back the payment inserts.
        let Some((version,)) = version else {
            return Err(StoreError::Conflict(booking.id));
        };

        tx.commit()
            .await
            .map_err(database("Failed to commit booking change"))?;

        booking.version = version;
        tracing::debug!(
            booking_id = %booking.id,
            status = %booking.status,
            version,
            payments = new_payments.len(),
            "Booking committed"
        );
        Ok(booking)
    }

    async fn record_unmatched(&self, event: UnmatchedPaymentEvent) -> Result<bool, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO unmatched_payment_events (id, gateway, reference, booking_id,
                                                   amount_minor, currency, succeeded, received_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (gateway, reference, succeeded) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(event.gateway.as_str())
        .bind(&event.reference)
        .bind(event.booking_id.map(|id| *id.as_uuid()))
        .bind(event.amount.amount_minor)
        .bind(&event.amount.currency)
        .bind(event.succeeded)
        .bind(event.received_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(database("Failed to record unmatched payment event"))?;
        Ok(inserted.rows_affected() == 1)
    }
}

/// Sessions in `PostgreSQL`, joined with the user's role.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: Arc<PgPool>,
}

impl PostgresSessionStore {
    /// Use the shared pool.
    #[must_use]
    pub const fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, StoreError> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT u.id, u.role
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = $1 AND s.expires_at > now()",
        )
        .bind(hash_token(token))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(database("Failed to resolve session"))?;

        row.map(|(user_id, role)| {
            Ok(Actor::new(UserId::from_uuid(user_id), parse::<Role>(&role)?))
        })
        .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_status_is_a_database_error() {
        let row: BookingRow = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            "ARCHIVED".to_string(),
            None,
            None,
            None,
            false,
            0,
        );
        assert!(matches!(booking_from_row(row), Err(StoreError::Database(_))));
    }

    #[test]
    fn payment_row_round_trips_enums() {
        let row: PaymentRow = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            250_000,
            "ngn".to_string(),
            "PAID".to_string(),
            "flutterwave".to_string(),
            "tx-1".to_string(),
            Utc::now(),
        );
        let payment = payment_from_row(row).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.method, PaymentMethod::Flutterwave);
        assert_eq!(payment.amount.currency, "NGN");
    }
}

//! User-facing notifications emitted after booking changes.
//!
//! Delivery is best-effort: the service runs notification effects only
//! after the booking change is committed, and a failure is logged rather
//! than rolling anything back.

use crate::types::UserId;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Booking moved to CONFIRMED
    BookingConfirmed,
    /// Booking was cancelled
    BookingCancelled,
    /// Any other participant-driven status change
    BookingStatusChanged,
    /// A charge was recorded for the booking
    PaymentReceived,
    /// A charge failed or expired
    PaymentFailed,
}

impl NotificationKind {
    /// Stored spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingConfirmed => "BOOKING_CONFIRMED",
            Self::BookingCancelled => "BOOKING_CANCELLED",
            Self::BookingStatusChanged => "BOOKING_STATUS_CHANGED",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

/// One notification for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Recipient
    pub user_id: UserId,
    /// Category
    pub kind: NotificationKind,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Structured payload for the client (booking id, status, ...)
    pub data: serde_json::Value,
}

impl Notification {
    /// Build a notification.
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            data,
        }
    }
}

/// Notification delivery failed.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The notification could not be stored
    #[error("failed to store notification: {0}")]
    Storage(String),
}

/// Creates notification records.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notification`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the notification could not be stored.
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the `notifications` table.
#[derive(Clone)]
pub struct PostgresNotifier {
    pool: Arc<PgPool>,
}

impl PostgresNotifier {
    /// Use the shared pool.
    #[must_use]
    pub const fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for PostgresNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, data)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(notification.user_id.as_uuid())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| NotifyError::Storage(e.to_string()))?;

        tracing::debug!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification stored"
        );
        Ok(())
    }
}

/// Keeps notifications in memory so tests can inspect them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// A notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that rejects every notification.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: AtomicBool::new(true),
        }
    }

    /// Everything delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivered notifications of one kind.
    #[must_use]
    pub fn sent_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.kind == kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(NotifyError::Storage("notifier configured to fail".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}

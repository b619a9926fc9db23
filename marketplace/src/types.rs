//! Domain types for the booking and payment core.
//!
//! Identifiers are UUID newtypes, roles and statuses are closed enums with
//! the wire spelling used by the HTTP API and the database, and amounts are
//! kept in minor units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Wraps an existing `Uuid` as a `", stringify!($name), "`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user (student, tutor or admin)
    UserId
);
uuid_id!(
    /// Unique identifier for a booking
    BookingId
);
uuid_id!(
    /// Unique identifier for a payment record
    PaymentId
);

/// A stored string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Roles and actors
// ============================================================================

/// Account role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Books and pays for sessions
    Student,
    /// Delivers sessions
    Tutor,
    /// Platform operator
    Admin,
    /// Platform operator with account management rights
    SuperAdmin,
}

impl Role {
    /// Database/wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Tutor => "TUTOR",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Whether the role may use operator endpoints.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        match self {
            Self::Admin | Self::SuperAdmin => true,
            Self::Student | Self::Tutor => false,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Self::Student),
            "TUTOR" => Ok(Self::Tutor),
            "ADMIN" => Ok(Self::Admin),
            "SUPER_ADMIN" => Ok(Self::SuperAdmin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Who is calling
    pub user_id: UserId,
    /// Their account role
    pub role: Role,
}

impl Actor {
    /// Build an actor.
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

// ============================================================================
// Booking
// ============================================================================

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Requested, awaiting payment or tutor confirmation
    Pending,
    /// Paid for or confirmed by the tutor
    Confirmed,
    /// Session is running
    InProgress,
    /// Session delivered (terminal)
    Completed,
    /// Called off (terminal)
    Cancelled,
}

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Database/wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("booking status", s))
    }
}

/// A tutoring session between one student and one tutor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// The student who booked
    pub student_id: UserId,
    /// The tutor delivering the session
    pub tutor_id: UserId,
    /// When the session takes place
    pub scheduled_at: DateTime<Utc>,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// When the first successful charge was recorded
    pub paid_at: Option<DateTime<Utc>>,
    /// How the booking was paid for
    pub payment_method: Option<PaymentMethod>,
    /// Gateway transaction reference
    pub payment_reference: Option<String>,
    /// Booked for immediate start
    pub is_instant: bool,
    /// Optimistic concurrency counter, bumped on every committed change
    pub version: i64,
}

impl Booking {
    /// A fresh PENDING booking.
    #[must_use]
    pub fn pending(student_id: UserId, tutor_id: UserId, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: BookingId::new(),
            student_id,
            tutor_id,
            scheduled_at,
            status: BookingStatus::Pending,
            paid_at: None,
            payment_method: None,
            payment_reference: None,
            is_instant: false,
            version: 0,
        }
    }

    /// Whether `user` is the student or the tutor.
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.student_id == user || self.tutor_id == user
    }

    /// The other participant, if `user` is one of them.
    #[must_use]
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.student_id {
            Some(self.tutor_id)
        } else if user == self.tutor_id {
            Some(self.student_id)
        } else {
            None
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Status of a payment record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Awaiting gateway outcome
    Pending,
    /// Charge captured
    Paid,
    /// Charge declined, expired or not verifiable
    Failed,
}

impl PaymentStatus {
    /// Database/wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// How a booking was paid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Stripe Checkout
    Stripe,
    /// Flutterwave Standard
    Flutterwave,
    /// Paystack
    Paystack,
    /// Internal wallet balance
    Wallet,
    /// Confirmed by the tutor without an online charge
    Manual,
}

impl PaymentMethod {
    /// Database/wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Flutterwave => "flutterwave",
            Self::Paystack => "paystack",
            Self::Wallet => "wallet",
            Self::Manual => "manual",
        }
    }

    /// Methods that confirm a booking without a gateway charge.
    #[must_use]
    pub const fn is_offline(self) -> bool {
        matches!(self, Self::Wallet | Self::Manual)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "flutterwave" => Ok(Self::Flutterwave),
            "paystack" => Ok(Self::Paystack),
            "wallet" => Ok(Self::Wallet),
            "manual" => Ok(Self::Manual),
            other => Err(UnknownVariant::new("payment method", other)),
        }
    }
}

/// An amount in the currency's minor unit (cents, kobo).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in minor units
    pub amount_minor: i64,
    /// ISO 4217 code, upper case
    pub currency: String,
}

impl Money {
    /// Amount already in minor units.
    #[must_use]
    pub fn new(amount_minor: i64, currency: &str) -> Self {
        Self {
            amount_minor,
            currency: currency.to_ascii_uppercase(),
        }
    }

    /// Convert a major-unit amount (`5000.50` NGN) to minor units.
    ///
    /// Returns `None` for non-finite or out-of-range values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_major_units(amount: f64, currency: &str) -> Option<Self> {
        let minor = (amount * 100.0).round();
        if !minor.is_finite() || minor.abs() >= 9.0e15 {
            return None;
        }
        Some(Self::new(minor as i64, currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_minor / 100,
            (self.amount_minor % 100).abs(),
            self.currency
        )
    }
}

/// A monetary transaction tied to a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Payment ID
    pub id: PaymentId,
    /// Paying user (the booking's student)
    pub user_id: UserId,
    /// Booking paid for
    pub booking_id: BookingId,
    /// Amount reported by the gateway
    pub amount: Money,
    /// Outcome
    pub status: PaymentStatus,
    /// Gateway or offline method
    pub method: PaymentMethod,
    /// Gateway transaction reference
    pub reference: String,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}

/// A charge reported by a gateway, after signature verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeDetails {
    /// Gateway that reported it
    pub method: PaymentMethod,
    /// Gateway transaction reference (Stripe session id, Flutterwave `tx_ref`)
    pub reference: String,
    /// Booking named in the charge metadata, when the gateway carries it
    pub booking_id: Option<BookingId>,
    /// Amount charged
    pub amount: Money,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = BookingStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![BookingStatus::Completed, BookingStatus::Cancelled]);
    }

    #[test]
    fn status_spelling_matches_serde() {
        for status in BookingStatus::ALL {
            let json = serde_json::to_value(status).unwrap_or_default();
            assert_eq!(json, status.as_str());
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(status));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "OWNER".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "unknown role: \"OWNER\"");
        assert_eq!("SUPER_ADMIN".parse::<Role>(), Ok(Role::SuperAdmin));
    }

    #[test]
    fn only_operators_are_admins() {
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Tutor.is_admin());
        assert!(!Role::Student.is_admin());
    }

    #[test]
    fn major_units_are_rounded_to_minor() {
        let money = Money::from_major_units(5000.5, "ngn");
        assert_eq!(money, Some(Money::new(500_050, "NGN")));
        assert_eq!(Money::from_major_units(12.34, "USD"), Some(Money::new(1234, "USD")));
        assert_eq!(Money::from_major_units(f64::NAN, "NGN"), None);
    }

    #[test]
    fn money_displays_major_units() {
        assert_eq!(Money::new(12_345, "usd").to_string(), "123.45 USD");
    }

    #[test]
    fn counterpart_of_each_participant() {
        let student = UserId::new();
        let tutor = UserId::new();
        let booking = Booking::pending(student, tutor, Utc::now());

        assert_eq!(booking.counterpart(student), Some(tutor));
        assert_eq!(booking.counterpart(tutor), Some(student));
        assert_eq!(booking.counterpart(UserId::new()), None);
    }

    #[test]
    fn booking_serializes_camel_case() {
        let booking = Booking::pending(UserId::new(), UserId::new(), Utc::now());
        let json = serde_json::to_value(&booking).unwrap_or_default();
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("studentId").is_some());
        assert!(json["paidAt"].is_null());
    }
}

//! Booking aggregate: lifecycle status plus payment reconciliation.
//!
//! Three independent triggers drive a booking: a participant asking for a
//! status change, a gateway reporting a charge, and an operator promoting a
//! paid-but-stuck booking. The reducer evaluates the guards for each, records
//! the outcome as events, and describes the notifications to send. It does
//! no I/O; [`crate::app::BookingService`] persists the result and runs the
//! effects.

use crate::error::BookingError;
use crate::notifications::{Notification, NotificationKind, Notifier};
use crate::types::{
    Actor, Booking, BookingStatus, ChargeDetails, Payment, PaymentId, PaymentMethod,
    PaymentStatus,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tutorhub_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};

// ============================================================================
// State
// ============================================================================

/// A booking together with every payment recorded against it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingState {
    /// The booking, once loaded
    pub booking: Option<Booking>,
    /// Payment history, oldest first
    pub payments: Vec<Payment>,
    /// Error from the last command, cleared by any successful event
    pub last_error: Option<BookingError>,
}

impl BookingState {
    /// State for an existing booking with its payments.
    #[must_use]
    pub const fn new(booking: Booking, payments: Vec<Payment>) -> Self {
        Self {
            booking: Some(booking),
            payments,
            last_error: None,
        }
    }

    /// State for a booking with no payments yet.
    #[must_use]
    pub const fn with_booking(booking: Booking) -> Self {
        Self::new(booking, Vec::new())
    }

    /// Number of PAID records for this gateway transaction.
    #[must_use]
    pub fn paid_count(&self, method: PaymentMethod, reference: &str) -> usize {
        self.payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Paid && p.method == method && p.reference == reference)
            .count()
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Commands the service sends and events the reducer records.
#[derive(Clone, Debug)]
pub enum BookingAction {
    // Commands
    /// A participant asks to move the booking to `target`
    RequestStatusChange {
        /// Caller
        actor: Actor,
        /// Requested status
        target: BookingStatus,
    },

    /// A gateway reported a successful charge (signature already verified)
    RecordCharge {
        /// Normalized charge
        charge: ChargeDetails,
    },

    /// A gateway reported a failed or expired charge
    RecordChargeFailure {
        /// Normalized charge
        charge: ChargeDetails,
    },

    /// An operator promotes a paid booking stuck in PENDING
    AdminFix {
        /// Caller
        actor: Actor,
    },

    /// The tutor calls the session off
    TutorCancel {
        /// Caller
        actor: Actor,
        /// Free-text reason passed on to the student
        reason: Option<String>,
    },

    // Events
    /// Status moved
    StatusChanged {
        /// Previous status
        from: BookingStatus,
        /// New status
        to: BookingStatus,
        /// Payment method to record alongside (manual confirmation)
        payment_method: Option<PaymentMethod>,
        /// When
        changed_at: DateTime<Utc>,
    },

    /// A payment record was created
    PaymentRecorded {
        /// The new record
        payment: Payment,
    },

    /// A redelivered charge matched an existing record
    DuplicateChargeIgnored {
        /// Gateway transaction reference
        reference: String,
    },

    /// A command was refused
    ValidationFailed {
        /// Why
        error: BookingError,
    },
}

// ============================================================================
// Transition table
// ============================================================================

/// Who may request a participant-driven transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionRule {
    /// Only the booking's tutor
    TutorOnly,
    /// Either participant
    EitherParticipant,
}

/// Participant-driven transitions. `None` means the move is not allowed.
#[must_use]
pub const fn participant_transition(
    from: BookingStatus,
    to: BookingStatus,
) -> Option<TransitionRule> {
    use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, Pending};

    match (from, to) {
        (Pending, Confirmed) => Some(TransitionRule::TutorOnly),
        (Pending, Cancelled)
        | (Confirmed, InProgress | Completed | Cancelled)
        | (InProgress, Completed | Cancelled) => Some(TransitionRule::EitherParticipant),
        _ => None,
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Timestamps for status changes and payment records
    pub clock: Arc<dyn Clock>,
    /// Target of notification effects
    pub notifier: Arc<dyn Notifier>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { clock, notifier }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Reducer for the booking aggregate.
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies an event to state
    fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::StatusChanged {
                to, payment_method, ..
            } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.status = *to;
                    if payment_method.is_some() {
                        booking.payment_method = *payment_method;
                    }
                }
                state.last_error = None;
            },

            BookingAction::PaymentRecorded { payment } => {
                if let Some(booking) = state.booking.as_mut() {
                    let first_paid = payment.status == PaymentStatus::Paid
                        && !booking.status.is_terminal()
                        && booking.paid_at.is_none();
                    if first_paid {
                        booking.paid_at = Some(payment.created_at);
                        booking.payment_method = Some(payment.method);
                        booking.payment_reference = Some(payment.reference.clone());
                    }
                }
                state.payments.push(payment.clone());
                state.last_error = None;
            },

            BookingAction::DuplicateChargeIgnored { .. } => {
                state.last_error = None;
            },

            BookingAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },

            // Commands don't modify state
            BookingAction::RequestStatusChange { .. }
            | BookingAction::RecordCharge { .. }
            | BookingAction::RecordChargeFailure { .. }
            | BookingAction::AdminFix { .. }
            | BookingAction::TutorCancel { .. } => {},
        }
    }

    fn reject(state: &mut BookingState, error: BookingError) -> Effects {
        Self::apply_event(state, &BookingAction::ValidationFailed { error });
        SmallVec::new()
    }

    fn change_status(
        state: &mut BookingState,
        from: BookingStatus,
        to: BookingStatus,
        payment_method: Option<PaymentMethod>,
        env: &BookingEnvironment,
    ) {
        Self::apply_event(
            state,
            &BookingAction::StatusChanged {
                from,
                to,
                payment_method,
                changed_at: env.clock.now(),
            },
        );
    }

    fn request_status_change(
        state: &mut BookingState,
        actor: Actor,
        target: BookingStatus,
        env: &BookingEnvironment,
    ) -> Effects {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(state, missing_booking());
        };

        if !booking.is_participant(actor.user_id) {
            return Self::reject(state, BookingError::NotParticipant);
        }
        if booking.status.is_terminal() {
            return Self::reject(state, BookingError::TerminalState(booking.status));
        }
        let Some(rule) = participant_transition(booking.status, target) else {
            return Self::reject(
                state,
                BookingError::InvalidTransition {
                    from: booking.status,
                    to: target,
                },
            );
        };
        if rule == TransitionRule::TutorOnly && actor.user_id != booking.tutor_id {
            return Self::reject(
                state,
                BookingError::Forbidden(format!("Only the tutor can move a booking to {target}")),
            );
        }

        // A tutor confirming without a recorded charge is an offline payment,
        // even if a gateway checkout was started and never completed.
        let method = (target == BookingStatus::Confirmed
            && booking.paid_at.is_none()
            && !booking.payment_method.is_some_and(PaymentMethod::is_offline))
        .then_some(PaymentMethod::Manual);

        Self::change_status(state, booking.status, target, method, env);

        let Some(counterpart) = booking.counterpart(actor.user_id) else {
            return SmallVec::new();
        };
        let kind = match target {
            BookingStatus::Confirmed => NotificationKind::BookingConfirmed,
            BookingStatus::Cancelled => NotificationKind::BookingCancelled,
            BookingStatus::Pending | BookingStatus::InProgress | BookingStatus::Completed => {
                NotificationKind::BookingStatusChanged
            },
        };
        smallvec![notify(
            env,
            Notification::new(
                counterpart,
                kind,
                "Booking updated",
                format!("Your booking is now {target}"),
                json!({ "bookingId": booking.id, "status": target }),
            ),
        )]
    }

    fn record_charge(
        state: &mut BookingState,
        charge: ChargeDetails,
        env: &BookingEnvironment,
    ) -> Effects {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(state, missing_booking());
        };

        // Lookup before write: a redelivered webhook finds its own record.
        if state.paid_count(charge.method, &charge.reference) > 0 {
            Self::apply_event(
                state,
                &BookingAction::DuplicateChargeIgnored {
                    reference: charge.reference,
                },
            );
            return SmallVec::new();
        }

        let payment = Payment {
            id: PaymentId::new(),
            user_id: booking.student_id,
            booking_id: booking.id,
            amount: charge.amount,
            status: PaymentStatus::Paid,
            method: charge.method,
            reference: charge.reference,
            created_at: env.clock.now(),
        };
        let receipt = Notification::new(
            booking.student_id,
            NotificationKind::PaymentReceived,
            "Payment received",
            format!("We received your payment of {}", payment.amount),
            json!({
                "bookingId": booking.id,
                "paymentId": payment.id,
                "reference": payment.reference,
            }),
        );
        Self::apply_event(state, &BookingAction::PaymentRecorded { payment });

        let mut effects: Effects = smallvec![notify(env, receipt)];

        if booking.status == BookingStatus::Pending {
            Self::change_status(state, booking.status, BookingStatus::Confirmed, None, env);
            effects.extend(confirmation_notices(&booking, env));
        }

        effects
    }

    fn record_charge_failure(
        state: &mut BookingState,
        charge: ChargeDetails,
        env: &BookingEnvironment,
    ) -> Effects {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(state, missing_booking());
        };

        let known = state
            .payments
            .iter()
            .any(|p| p.method == charge.method && p.reference == charge.reference);
        if known {
            Self::apply_event(
                state,
                &BookingAction::DuplicateChargeIgnored {
                    reference: charge.reference,
                },
            );
            return SmallVec::new();
        }

        let payment = Payment {
            id: PaymentId::new(),
            user_id: booking.student_id,
            booking_id: booking.id,
            amount: charge.amount,
            status: PaymentStatus::Failed,
            method: charge.method,
            reference: charge.reference,
            created_at: env.clock.now(),
        };
        let notice = Notification::new(
            booking.student_id,
            NotificationKind::PaymentFailed,
            "Payment failed",
            "Your payment did not go through. Please try again.",
            json!({ "bookingId": booking.id, "reference": payment.reference }),
        );
        Self::apply_event(state, &BookingAction::PaymentRecorded { payment });

        smallvec![notify(env, notice)]
    }

    fn admin_fix(state: &mut BookingState, actor: Actor, env: &BookingEnvironment) -> Effects {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(state, missing_booking());
        };

        if !actor.role.is_admin() {
            return Self::reject(state, BookingError::AdminRequired);
        }
        if booking.status != BookingStatus::Pending || booking.paid_at.is_none() {
            return Self::reject(state, BookingError::NotEligibleForFix);
        }

        Self::change_status(state, booking.status, BookingStatus::Confirmed, None, env);
        confirmation_notices(&booking, env).into_iter().collect()
    }

    fn tutor_cancel(
        state: &mut BookingState,
        actor: Actor,
        reason: Option<String>,
        env: &BookingEnvironment,
    ) -> Effects {
        let Some(booking) = state.booking.clone() else {
            return Self::reject(state, missing_booking());
        };

        if actor.user_id != booking.tutor_id {
            return Self::reject(state, BookingError::NotTutor);
        }
        if booking.status.is_terminal() {
            return Self::reject(state, BookingError::TerminalState(booking.status));
        }

        Self::change_status(state, booking.status, BookingStatus::Cancelled, None, env);

        let message = match &reason {
            Some(reason) => format!("Your tutor cancelled the session: {reason}"),
            None => "Your tutor cancelled the session".to_string(),
        };
        smallvec![notify(
            env,
            Notification::new(
                booking.student_id,
                NotificationKind::BookingCancelled,
                "Booking cancelled",
                message,
                json!({ "bookingId": booking.id, "reason": reason }),
            ),
        )]
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::RequestStatusChange { actor, target } => {
                Self::request_status_change(state, actor, target, env)
            },
            BookingAction::RecordCharge { charge } => Self::record_charge(state, charge, env),
            BookingAction::RecordChargeFailure { charge } => {
                Self::record_charge_failure(state, charge, env)
            },
            BookingAction::AdminFix { actor } => Self::admin_fix(state, actor, env),
            BookingAction::TutorCancel { actor, reason } => {
                Self::tutor_cancel(state, actor, reason, env)
            },

            // ========== Events (replayed) ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

fn missing_booking() -> BookingError {
    BookingError::Validation("No booking loaded".to_string())
}

fn notify(env: &BookingEnvironment, notification: Notification) -> Effect<BookingAction> {
    let notifier = Arc::clone(&env.notifier);
    Effect::fire_and_forget(async move {
        let user_id = notification.user_id;
        let kind = notification.kind;
        if let Err(error) = notifier.notify(notification).await {
            tracing::warn!(%user_id, kind = kind.as_str(), %error, "Failed to deliver notification");
        }
    })
}

fn confirmation_notices(booking: &Booking, env: &BookingEnvironment) -> [Effect<BookingAction>; 2] {
    let data = json!({ "bookingId": booking.id, "status": BookingStatus::Confirmed });
    [
        notify(
            env,
            Notification::new(
                booking.student_id,
                NotificationKind::BookingConfirmed,
                "Booking confirmed",
                "Your session is confirmed",
                data.clone(),
            ),
        ),
        notify(
            env,
            Notification::new(
                booking.tutor_id,
                NotificationKind::BookingConfirmed,
                "New confirmed booking",
                "A student's booking is confirmed",
                data,
            ),
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifications::RecordingNotifier;
    use crate::types::{Money, Role, UserId};
    use tutorhub_testing::{ReducerTest, assertions, test_clock, test_instant};

    fn create_test_env() -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(test_clock()), Arc::new(RecordingNotifier::new()))
    }

    fn pending_booking() -> Booking {
        Booking::pending(UserId::new(), UserId::new(), test_instant())
    }

    fn booking_in(status: BookingStatus) -> Booking {
        let mut booking = pending_booking();
        booking.status = status;
        booking
    }

    fn tutor_of(booking: &Booking) -> Actor {
        Actor::new(booking.tutor_id, Role::Tutor)
    }

    fn student_of(booking: &Booking) -> Actor {
        Actor::new(booking.student_id, Role::Student)
    }

    fn stripe_charge(booking: &Booking, reference: &str) -> ChargeDetails {
        ChargeDetails {
            method: PaymentMethod::Stripe,
            reference: reference.to_string(),
            booking_id: Some(booking.id),
            amount: Money::new(5_000, "USD"),
        }
    }

    #[test]
    fn test_charge_confirms_pending_booking() {
        let booking = pending_booking();
        let charge = stripe_charge(&booking, "cs_test_1");

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RecordCharge { charge })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert_eq!(booking.paid_at, Some(test_instant()));
                assert_eq!(booking.payment_method, Some(PaymentMethod::Stripe));
                assert_eq!(booking.payment_reference.as_deref(), Some("cs_test_1"));
                assert_eq!(state.paid_count(PaymentMethod::Stripe, "cs_test_1"), 1);
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 3))
            .run();
    }

    #[test]
    fn test_redelivered_charge_is_ignored() {
        let booking = pending_booking();
        let charge = stripe_charge(&booking, "cs_test_1");

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RecordCharge {
                charge: charge.clone(),
            })
            .when_action(BookingAction::RecordCharge { charge })
            .then_state(|state| {
                assert_eq!(state.payments.len(), 1);
                assert_eq!(state.booking.as_ref().unwrap().paid_at, Some(test_instant()));
            })
            // Only the first delivery notifies.
            .then_effects(|effects| assertions::assert_effects_count(effects, 3))
            .run();
    }

    #[test]
    fn test_charge_on_confirmed_booking_is_recorded_without_transition() {
        let booking = booking_in(BookingStatus::Confirmed);
        let charge = stripe_charge(&booking, "cs_late");

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RecordCharge { charge })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert!(booking.paid_at.is_some());
                assert_eq!(state.payments.len(), 1);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_charge_on_cancelled_booking_keeps_status() {
        let booking = booking_in(BookingStatus::Cancelled);
        let charge = stripe_charge(&booking, "cs_after_cancel");

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RecordCharge { charge })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Cancelled);
                assert!(booking.paid_at.is_none());
                assert_eq!(state.payments[0].status, PaymentStatus::Paid);
            })
            .run();
    }

    #[test]
    fn test_failed_charge_is_recorded_once() {
        let booking = pending_booking();
        let charge = stripe_charge(&booking, "cs_declined");

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RecordChargeFailure {
                charge: charge.clone(),
            })
            .when_action(BookingAction::RecordChargeFailure { charge })
            .then_state(|state| {
                assert_eq!(state.payments.len(), 1);
                assert_eq!(state.payments[0].status, PaymentStatus::Failed);
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Pending);
                assert!(booking.paid_at.is_none());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_admin_fix_promotes_paid_pending_booking() {
        let mut booking = pending_booking();
        booking.paid_at = Some(test_instant());
        let admin = Actor::new(UserId::new(), Role::Admin);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::AdminFix { actor: admin })
            .then_state(|state| {
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Confirmed);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn test_admin_fix_rejects_unpaid_booking() {
        let admin = Actor::new(UserId::new(), Role::SuperAdmin);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(pending_booking()))
            .when_action(BookingAction::AdminFix { actor: admin })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(BookingError::NotEligibleForFix));
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Pending);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_admin_fix_requires_admin_role() {
        let mut booking = pending_booking();
        booking.paid_at = Some(test_instant());
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::AdminFix { actor: tutor })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(BookingError::AdminRequired));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_non_participant_cannot_change_status() {
        let booking = booking_in(BookingStatus::Confirmed);
        let before = booking.clone();
        let stranger = Actor::new(UserId::new(), Role::Student);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: stranger,
                target: BookingStatus::Completed,
            })
            .then_state(move |state| {
                assert_eq!(state.last_error, Some(BookingError::NotParticipant));
                assert_eq!(state.booking.as_ref(), Some(&before));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_pending_cannot_jump_to_completed() {
        let booking = pending_booking();
        let student = student_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: student,
                target: BookingStatus::Completed,
            })
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(BookingError::InvalidTransition {
                        from: BookingStatus::Pending,
                        to: BookingStatus::Completed,
                    })
                );
            })
            .run();
    }

    #[test]
    fn test_student_cannot_confirm() {
        let booking = pending_booking();
        let student = student_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: student,
                target: BookingStatus::Confirmed,
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(BookingError::Forbidden(_))));
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Pending);
            })
            .run();
    }

    #[test]
    fn test_tutor_confirmation_without_charge_is_manual() {
        let booking = pending_booking();
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: tutor,
                target: BookingStatus::Confirmed,
            })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert_eq!(booking.payment_method, Some(PaymentMethod::Manual));
                assert!(booking.paid_at.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn test_tutor_confirmation_after_abandoned_checkout_is_manual() {
        let mut booking = pending_booking();
        booking.payment_method = Some(PaymentMethod::Flutterwave);
        booking.payment_reference = Some("tx-123".into());
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: tutor,
                target: BookingStatus::Confirmed,
            })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert!(booking.paid_at.is_none());
                assert_eq!(booking.payment_method, Some(PaymentMethod::Manual));
                assert_eq!(booking.payment_reference.as_deref(), Some("tx-123"));
            })
            .run();
    }

    #[test]
    fn test_tutor_confirmation_keeps_wallet_payment() {
        let mut booking = pending_booking();
        booking.payment_method = Some(PaymentMethod::Wallet);
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: tutor,
                target: BookingStatus::Confirmed,
            })
            .then_state(|state| {
                let booking = state.booking.as_ref().unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert_eq!(booking.payment_method, Some(PaymentMethod::Wallet));
            })
            .run();
    }

    #[test]
    fn test_participants_walk_the_lifecycle() {
        let booking = booking_in(BookingStatus::Confirmed);
        let student = student_of(&booking);
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::RequestStatusChange {
                actor: tutor,
                target: BookingStatus::InProgress,
            })
            .when_action(BookingAction::RequestStatusChange {
                actor: student,
                target: BookingStatus::Completed,
            })
            .then_state(|state| {
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Completed);
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn test_tutor_cancel_notifies_student() {
        let booking = booking_in(BookingStatus::Confirmed);
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::TutorCancel {
                actor: tutor,
                reason: Some("Unwell".to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Cancelled);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_tutor_cancel_on_completed_booking_is_rejected() {
        let booking = booking_in(BookingStatus::Completed);
        let tutor = tutor_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::TutorCancel {
                actor: tutor,
                reason: None,
            })
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(BookingError::TerminalState(BookingStatus::Completed))
                );
                assert_eq!(state.booking.as_ref().unwrap().status, BookingStatus::Completed);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_student_cannot_use_tutor_cancel() {
        let booking = pending_booking();
        let student = student_of(&booking);

        ReducerTest::new(BookingReducer::new())
            .with_env(create_test_env())
            .given_state(BookingState::with_booking(booking))
            .when_action(BookingAction::TutorCancel {
                actor: student,
                reason: None,
            })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(BookingError::NotTutor));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_transition_table() {
        use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, Pending};

        assert_eq!(participant_transition(Pending, Confirmed), Some(TransitionRule::TutorOnly));
        assert_eq!(
            participant_transition(InProgress, Completed),
            Some(TransitionRule::EitherParticipant)
        );
        assert_eq!(participant_transition(Pending, InProgress), None);
        assert_eq!(participant_transition(Confirmed, Confirmed), None);
        assert_eq!(participant_transition(Confirmed, Pending), None);
        for to in BookingStatus::ALL {
            assert_eq!(participant_transition(Completed, to), None);
            assert_eq!(participant_transition(Cancelled, to), None);
        }
    }

    #[tokio::test]
    async fn test_effects_deliver_notifications() {
        let notifier = Arc::new(RecordingNotifier::new());
        let env = BookingEnvironment::new(Arc::new(test_clock()), notifier.clone());
        let booking = pending_booking();
        let (student, tutor) = (booking.student_id, booking.tutor_id);
        let mut state = BookingState::with_booking(booking.clone());

        let effects = BookingReducer::new().reduce(
            &mut state,
            BookingAction::RecordCharge {
                charge: stripe_charge(&booking, "cs_notify"),
            },
            &env,
        );
        for effect in effects {
            if let Effect::Future(future) = effect {
                assert!(future.await.is_none());
            }
        }

        let confirmed = notifier.sent_of_kind(NotificationKind::BookingConfirmed);
        let recipients: Vec<_> = confirmed.iter().map(|n| n.user_id).collect();
        assert_eq!(recipients, vec![student, tutor]);
        assert_eq!(notifier.sent_of_kind(NotificationKind::PaymentReceived).len(), 1);
    }
}

//! Booking service: the imperative shell around [`BookingReducer`].
//!
//! Every operation follows the same loop:
//!
//! 1. load the booking and its payments
//! 2. run the reducer; a refused command returns its error and persists nothing
//! 3. commit the changed booking and new payments, conditional on the version
//!    the reducer saw
//! 4. on a lost race, reload and run the reducer again, up to
//!    `max_commit_attempts` times, then answer [`BookingError::Busy`]
//! 5. run the reducer's effects (notifications) best-effort
//!
//! Gateway webhooks enter through [`BookingService::handle_webhook`].

use super::effects::run_effects;
use crate::aggregates::{BookingAction, BookingEnvironment, BookingReducer, BookingState};
use crate::config::BookingConfig;
use crate::error::BookingError;
use crate::gateways::{GatewayError, PaymentGateway, WebhookEvent};
use crate::metrics;
use crate::store::{BookingCommit, BookingStore, StoreError, UnmatchedPaymentEvent};
use crate::types::{
    Actor, Booking, BookingId, BookingStatus, ChargeDetails, Payment, PaymentMethod,
    PaymentStatus,
};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tutorhub_core::reducer::Reducer;

/// What a gateway charge did to the booking it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Payment recorded and the booking moved PENDING → CONFIRMED
    Confirmed,
    /// Payment recorded, status untouched
    Recorded,
    /// The charge was already recorded
    Duplicate,
    /// No booking matches the charge
    Unmatched,
}

impl ChargeOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Recorded => "recorded",
            Self::Duplicate => "duplicate",
            Self::Unmatched => "unmatched",
        }
    }
}

/// What a webhook delivery amounted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A successful charge was applied
    Charge(ChargeOutcome),
    /// A failed charge was applied
    Failure(ChargeOutcome),
    /// Signed correctly but not acted on
    Ignored,
}

impl WebhookOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Charge(outcome) => outcome.as_str(),
            Self::Failure(ChargeOutcome::Unmatched) => "failure_unmatched",
            Self::Failure(_) => "failure",
            Self::Ignored => "ignored",
        }
    }
}

/// Payment status of a booking as shown to its participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    /// A charge has been captured for the booking
    pub is_paid: bool,
    /// Method of the recorded payment, or the offline confirmation path
    pub payment_method: Option<PaymentMethod>,
    /// Gateway transaction reference
    pub payment_reference: Option<String>,
    /// When the charge was captured
    pub paid_at: Option<DateTime<Utc>>,
    /// Amount in minor units
    pub amount: Option<i64>,
    /// ISO currency code
    pub currency: Option<String>,
    /// Status of the most relevant payment record
    pub status: Option<PaymentStatus>,
}

impl PaymentVerification {
    fn from_state(booking: &Booking, payments: &[Payment]) -> Self {
        // Prefer the record the booking points at, then any PAID one, then the latest attempt.
        let payment = payments
            .iter()
            .rev()
            .find(|p| {
                p.status == PaymentStatus::Paid
                    && booking.payment_reference.as_deref() == Some(p.reference.as_str())
            })
            .or_else(|| payments.iter().rev().find(|p| p.status == PaymentStatus::Paid))
            .or_else(|| payments.last());

        Self {
            is_paid: booking.paid_at.is_some(),
            payment_method: booking.payment_method.or(payment.map(|p| p.method)),
            payment_reference: booking
                .payment_reference
                .clone()
                .or_else(|| payment.map(|p| p.reference.clone())),
            paid_at: booking.paid_at,
            amount: payment.map(|p| p.amount.amount_minor),
            currency: payment.map(|p| p.amount.currency.clone()),
            status: payment.map(|p| p.status),
        }
    }
}

/// Result of one committed reducer run.
struct Applied {
    before: Booking,
    after: Booking,
    new_payments: Vec<Payment>,
}

/// Applies booking commands against a [`BookingStore`].
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    env: BookingEnvironment,
    reducer: BookingReducer,
    max_commit_attempts: u32,
}

impl BookingService {
    /// Creates a new `BookingService`
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, env: BookingEnvironment, config: BookingConfig) -> Self {
        Self {
            store,
            env,
            reducer: BookingReducer::new(),
            max_commit_attempts: config.max_commit_attempts.max(1),
        }
    }

    /// Move a booking to `target` on behalf of a participant.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotParticipant`, `TerminalState`, `InvalidTransition`,
    /// `Forbidden`, `Busy` or `Storage`.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: Actor,
        booking_id: BookingId,
        target: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let applied = self
            .apply(booking_id, || BookingAction::RequestStatusChange { actor, target })
            .await?;
        Ok(applied.after)
    }

    /// Cancel a booking on behalf of its tutor.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotTutor`, `TerminalState`, `Busy` or `Storage`.
    #[tracing::instrument(skip(self, reason), fields(user_id = %actor.user_id))]
    pub async fn tutor_cancel(
        &self,
        actor: Actor,
        booking_id: BookingId,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let applied = self
            .apply(booking_id, || BookingAction::TutorCancel {
                actor,
                reason: reason.clone(),
            })
            .await?;
        Ok(applied.after)
    }

    /// Promote a paid booking stuck in PENDING.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AdminRequired`, `NotEligibleForFix`, `Busy` or `Storage`.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn admin_fix(&self, actor: Actor, booking_id: BookingId) -> Result<Booking, BookingError> {
        let applied = self
            .apply(booking_id, || BookingAction::AdminFix { actor })
            .await?;
        tracing::info!(%booking_id, admin_id = %actor.user_id, "Booking fixed by admin");
        Ok(applied.after)
    }

    /// Record a verified successful charge.
    ///
    /// # Errors
    ///
    /// `Busy` or `Storage`. A charge with no booking is not an error.
    #[tracing::instrument(skip(self, charge), fields(gateway = %charge.method, reference = %charge.reference))]
    pub async fn apply_charge(&self, charge: ChargeDetails) -> Result<ChargeOutcome, BookingError> {
        let Some(booking_id) = self.locate(&charge).await? else {
            return self.unmatched(charge, true).await;
        };

        if let Some(owner) = self.paid_elsewhere(&charge, booking_id).await? {
            return Ok(Self::misdirected(&charge, booking_id, owner));
        }

        let result = self
            .apply(booking_id, || BookingAction::RecordCharge {
                charge: charge.clone(),
            })
            .await;
        let applied = match result {
            Ok(applied) => applied,
            Err(BookingError::NotFound(_)) => return self.unmatched(charge, true).await,
            // Another booking may have won the PAID record between the check and the commit.
            Err(BookingError::Busy) => {
                return match self.paid_elsewhere(&charge, booking_id).await? {
                    Some(owner) => Ok(Self::misdirected(&charge, booking_id, owner)),
                    None => Err(BookingError::Busy),
                };
            },
            Err(error) => return Err(error),
        };

        let outcome = if applied.new_payments.is_empty() {
            ChargeOutcome::Duplicate
        } else if applied.before.status == BookingStatus::Pending
            && applied.after.status == BookingStatus::Confirmed
        {
            ChargeOutcome::Confirmed
        } else {
            ChargeOutcome::Recorded
        };

        if outcome == ChargeOutcome::Duplicate {
            tracing::info!(%booking_id, "Charge already recorded, ignoring redelivery");
        } else if applied.after.status.is_terminal() {
            tracing::warn!(
                %booking_id,
                status = %applied.after.status,
                "Charge recorded against a closed booking"
            );
        }
        Ok(outcome)
    }

    /// Record a failed or expired charge.
    ///
    /// # Errors
    ///
    /// `Busy` or `Storage`.
    #[tracing::instrument(skip(self, charge), fields(gateway = %charge.method, reference = %charge.reference))]
    pub async fn apply_charge_failure(
        &self,
        charge: ChargeDetails,
    ) -> Result<ChargeOutcome, BookingError> {
        let Some(booking_id) = self.locate(&charge).await? else {
            return self.unmatched(charge, false).await;
        };

        let result = self
            .apply(booking_id, || BookingAction::RecordChargeFailure {
                charge: charge.clone(),
            })
            .await;
        let applied = match result {
            Ok(applied) => applied,
            Err(BookingError::NotFound(_)) => return self.unmatched(charge, false).await,
            Err(error) => return Err(error),
        };

        Ok(if applied.new_payments.is_empty() {
            ChargeOutcome::Duplicate
        } else {
            ChargeOutcome::Recorded
        })
    }

    /// Payment status of a booking, for its participants and operators.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotParticipant` or `Storage`.
    pub async fn payment_verification(
        &self,
        actor: Actor,
        booking_id: BookingId,
    ) -> Result<PaymentVerification, BookingError> {
        let snapshot = self
            .store
            .load(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        if !snapshot.booking.is_participant(actor.user_id) && !actor.role.is_admin() {
            return Err(BookingError::NotParticipant);
        }

        Ok(PaymentVerification::from_state(
            &snapshot.booking,
            &snapshot.payments,
        ))
    }

    /// Verify, parse and apply one webhook delivery.
    ///
    /// Gateways whose webhooks cannot be trusted on their own have every
    /// success confirmed through their API first; a success the API does not
    /// back up is recorded as a failure.
    ///
    /// # Errors
    ///
    /// - `Signature` or `Validation` when the delivery is rejected
    /// - `Gateway` when the confirmation call fails, so the gateway retries
    /// - `Busy` or `Storage` from applying the charge
    pub async fn handle_webhook(
        &self,
        gateway: &dyn PaymentGateway,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookOutcome, BookingError> {
        let method = gateway.method();
        let result = self.process_webhook(gateway, body, headers).await;

        match &result {
            Ok(outcome) => {
                metrics::record_webhook(method, outcome.label());
                tracing::info!(gateway = %method, outcome = outcome.label(), "Webhook processed");
            },
            Err(BookingError::Signature(reason)) => {
                metrics::record_webhook(method, "rejected");
                tracing::warn!(gateway = %method, %reason, "Webhook signature rejected");
            },
            Err(error) => {
                metrics::record_webhook(method, "error");
                tracing::error!(gateway = %method, %error, "Webhook processing failed");
            },
        }
        result
    }

    async fn process_webhook(
        &self,
        gateway: &dyn PaymentGateway,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookOutcome, BookingError> {
        match gateway.parse_webhook(body, headers)? {
            WebhookEvent::Ignored { event_type } => {
                tracing::debug!(gateway = %gateway.method(), %event_type, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            },
            WebhookEvent::ChargeFailed(charge) => {
                Ok(WebhookOutcome::Failure(self.apply_charge_failure(charge).await?))
            },
            WebhookEvent::ChargeSucceeded(charge) => {
                if gateway.verifies_before_trust() && !Self::confirmed(gateway, &charge).await? {
                    return Ok(WebhookOutcome::Failure(self.apply_charge_failure(charge).await?));
                }
                Ok(WebhookOutcome::Charge(self.apply_charge(charge).await?))
            },
        }
    }

    async fn confirmed(
        gateway: &dyn PaymentGateway,
        charge: &ChargeDetails,
    ) -> Result<bool, GatewayError> {
        let verification = gateway.verify_transaction(&charge.reference).await?;
        let confirmed = verification.confirms(charge);
        if !confirmed {
            tracing::warn!(
                gateway = %charge.method,
                reference = %charge.reference,
                reported = %charge.amount,
                verified = %verification.amount,
                success = verification.success,
                "Gateway did not confirm webhook charge"
            );
        }
        Ok(confirmed)
    }

    /// Booking a charge belongs to: metadata first, then the payment reference.
    async fn locate(&self, charge: &ChargeDetails) -> Result<Option<BookingId>, BookingError> {
        if let Some(id) = charge.booking_id {
            return Ok(Some(id));
        }
        Ok(self
            .store
            .find_by_payment_reference(charge.method, &charge.reference)
            .await?)
    }

    /// Booking other than `booking_id` that already holds the PAID record
    /// for this charge.
    async fn paid_elsewhere(
        &self,
        charge: &ChargeDetails,
        booking_id: BookingId,
    ) -> Result<Option<BookingId>, BookingError> {
        let owner = self
            .store
            .find_paid_payment(charge.method, &charge.reference)
            .await?;
        Ok(owner.filter(|owner| *owner != booking_id))
    }

    fn misdirected(charge: &ChargeDetails, booking_id: BookingId, owner: BookingId) -> ChargeOutcome {
        tracing::error!(
            %booking_id,
            paid_booking_id = %owner,
            gateway = %charge.method,
            reference = %charge.reference,
            amount = %charge.amount,
            "Charge is already recorded as paid on another booking"
        );
        ChargeOutcome::Duplicate
    }

    async fn unmatched(
        &self,
        charge: ChargeDetails,
        succeeded: bool,
    ) -> Result<ChargeOutcome, BookingError> {
        let event = UnmatchedPaymentEvent {
            gateway: charge.method,
            reference: charge.reference,
            booking_id: charge.booking_id,
            amount: charge.amount,
            succeeded,
            received_at: self.env.clock.now(),
        };

        // Redeliveries of an already parked event are kept once.
        if !self.store.record_unmatched(event.clone()).await? {
            tracing::debug!(
                gateway = %event.gateway,
                reference = %event.reference,
                succeeded,
                "Unmatched gateway event already recorded"
            );
            return Ok(ChargeOutcome::Unmatched);
        }

        metrics::record_unmatched(event.gateway);
        if succeeded {
            tracing::error!(
                gateway = %event.gateway,
                reference = %event.reference,
                booking_id = ?event.booking_id,
                amount = %event.amount,
                "Gateway charge matches no booking"
            );
        } else {
            tracing::warn!(
                gateway = %event.gateway,
                reference = %event.reference,
                booking_id = ?event.booking_id,
                amount = %event.amount,
                "Failed gateway charge matches no booking"
            );
        }
        Ok(ChargeOutcome::Unmatched)
    }

    /// Load, reduce, commit, retry on lost races, then run effects.
    async fn apply<F>(&self, booking_id: BookingId, action: F) -> Result<Applied, BookingError>
    where
        F: Fn() -> BookingAction,
    {
        for attempt in 1..=self.max_commit_attempts {
            let snapshot = self
                .store
                .load(booking_id)
                .await?
                .ok_or(BookingError::NotFound(booking_id))?;
            let before = snapshot.booking.clone();
            let known_payments = snapshot.payments.len();

            let mut state = BookingState::new(snapshot.booking, snapshot.payments);
            let effects = self.reducer.reduce(&mut state, action(), &self.env);

            if let Some(error) = state.last_error.take() {
                tracing::debug!(%booking_id, %error, "Booking command refused");
                return Err(error);
            }

            let after = state.booking.take().unwrap_or_else(|| before.clone());
            let new_payments = state.payments.split_off(known_payments);

            if after == before && new_payments.is_empty() {
                run_effects(effects).await;
                return Ok(Applied {
                    after: before.clone(),
                    before,
                    new_payments,
                });
            }

            let commit = BookingCommit {
                booking: after,
                expected_version: before.version,
                new_payments: new_payments.clone(),
            };

            match self.store.commit(commit).await {
                Ok(committed) => {
                    Self::record_committed(&before, &committed, &new_payments);
                    let feedback = run_effects(effects).await;
                    if !feedback.is_empty() {
                        tracing::debug!(count = feedback.len(), "Dropping effect feedback actions");
                    }
                    return Ok(Applied {
                        before,
                        after: committed,
                        new_payments,
                    });
                },
                Err(error @ (StoreError::Conflict(_) | StoreError::DuplicatePayment { .. })) => {
                    tracing::warn!(
                        %booking_id,
                        attempt,
                        max_attempts = self.max_commit_attempts,
                        %error,
                        "Booking commit lost a race, retrying"
                    );
                },
                Err(error) => return Err(error.into()),
            }
        }

        tracing::error!(
            %booking_id,
            attempts = self.max_commit_attempts,
            "Giving up on booking commit after repeated conflicts"
        );
        Err(BookingError::Busy)
    }

    fn record_committed(before: &Booking, after: &Booking, new_payments: &[Payment]) {
        if before.status != after.status {
            metrics::record_transition(after.status);
            tracing::info!(
                booking_id = %after.id,
                from = %before.status,
                to = %after.status,
                version = after.version,
                "Booking status changed"
            );
        }
        for payment in new_payments {
            metrics::record_payment(payment.method, payment.status);
            tracing::info!(
                booking_id = %payment.booking_id,
                payment_id = %payment.id,
                method = %payment.method,
                status = payment.status.as_str(),
                reference = %payment.reference,
                amount = %payment.amount,
                "Payment recorded"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationKind, RecordingNotifier};
    use crate::store::{BookingSnapshot, InMemoryBookingStore};
    use crate::types::{Money, Role, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tutorhub_testing::{test_clock, test_instant};

    struct Fixture {
        store: Arc<InMemoryBookingStore>,
        notifier: Arc<RecordingNotifier>,
        service: BookingService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBookingStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let env = BookingEnvironment::new(Arc::new(test_clock()), notifier.clone());
        let service = BookingService::new(store.clone(), env, BookingConfig::default());
        Fixture {
            store,
            notifier,
            service,
        }
    }

    async fn seeded(fixture: &Fixture) -> Booking {
        let booking = Booking::pending(UserId::new(), UserId::new(), test_instant());
        fixture.store.insert(booking.clone()).await;
        booking
    }

    fn charge_for(booking: &Booking, reference: &str) -> ChargeDetails {
        ChargeDetails {
            method: PaymentMethod::Stripe,
            reference: reference.to_string(),
            booking_id: Some(booking.id),
            amount: Money::new(5000, "USD"),
        }
    }

    #[tokio::test]
    async fn charge_confirms_and_bumps_version() {
        let f = fixture();
        let booking = seeded(&f).await;

        let outcome = f.service.apply_charge(charge_for(&booking, "cs_1")).await.unwrap();

        assert_eq!(outcome, ChargeOutcome::Confirmed);
        let stored = f.store.booking(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.paid_at, Some(test_instant()));
        assert_eq!(f.notifier.sent_of_kind(NotificationKind::BookingConfirmed).len(), 2);
    }

    #[tokio::test]
    async fn refused_command_persists_nothing_and_sends_nothing() {
        let f = fixture();
        let booking = seeded(&f).await;
        let stranger = Actor::new(UserId::new(), Role::Student);

        let err = f
            .service
            .update_status(stranger, booking.id, BookingStatus::Cancelled)
            .await
            .unwrap_err();

        assert_eq!(err, BookingError::NotParticipant);
        assert_eq!(f.store.booking(booking.id).await.unwrap(), booking);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let f = fixture();
        let id = BookingId::new();
        let tutor = Actor::new(UserId::new(), Role::Tutor);

        let err = f.service.tutor_cancel(tutor, id, None).await.unwrap_err();
        assert_eq!(err, BookingError::NotFound(id));
    }

    #[tokio::test]
    async fn charge_without_booking_is_kept_for_follow_up() {
        let f = fixture();
        let charge = ChargeDetails {
            method: PaymentMethod::Flutterwave,
            reference: "tx-orphan".into(),
            booking_id: None,
            amount: Money::new(500_000, "NGN"),
        };

        let outcome = f.service.apply_charge(charge).await.unwrap();

        assert_eq!(outcome, ChargeOutcome::Unmatched);
        let unmatched = f.store.unmatched().await;
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].reference, "tx-orphan");
        assert!(unmatched[0].succeeded);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_the_operation() {
        let store = Arc::new(InMemoryBookingStore::new());
        let env = BookingEnvironment::new(Arc::new(test_clock()), Arc::new(RecordingNotifier::failing()));
        let service = BookingService::new(store.clone(), env, BookingConfig::default());
        let booking = Booking::pending(UserId::new(), UserId::new(), test_instant());
        store.insert(booking.clone()).await;

        let outcome = service.apply_charge(charge_for(&booking, "cs_1")).await.unwrap();

        assert_eq!(outcome, ChargeOutcome::Confirmed);
        assert_eq!(
            store.booking(booking.id).await.unwrap().status,
            BookingStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn verification_is_for_participants_and_admins() {
        let f = fixture();
        let booking = seeded(&f).await;
        f.service.apply_charge(charge_for(&booking, "cs_1")).await.unwrap();

        let student = Actor::new(booking.student_id, Role::Student);
        let verification = f.service.payment_verification(student, booking.id).await.unwrap();
        assert!(verification.is_paid);
        assert_eq!(verification.payment_method, Some(PaymentMethod::Stripe));
        assert_eq!(verification.payment_reference.as_deref(), Some("cs_1"));
        assert_eq!(verification.amount, Some(5000));
        assert_eq!(verification.status, Some(PaymentStatus::Paid));

        let admin = Actor::new(UserId::new(), Role::Admin);
        assert!(f.service.payment_verification(admin, booking.id).await.is_ok());

        let stranger = Actor::new(UserId::new(), Role::Tutor);
        assert_eq!(
            f.service
                .payment_verification(stranger, booking.id)
                .await
                .unwrap_err(),
            BookingError::NotParticipant
        );
    }

    #[tokio::test]
    async fn unpaid_booking_verification_is_empty() {
        let f = fixture();
        let booking = seeded(&f).await;
        let tutor = Actor::new(booking.tutor_id, Role::Tutor);

        let verification = f.service.payment_verification(tutor, booking.id).await.unwrap();

        assert!(!verification.is_paid);
        assert_eq!(verification.payment_method, None);
        assert_eq!(verification.status, None);
        let json = serde_json::to_value(&verification).unwrap();
        assert_eq!(json["isPaid"], false);
        assert!(json["paidAt"].is_null());
    }

    /// Loses every commit to a concurrent writer.
    struct AlwaysConflicting {
        inner: InMemoryBookingStore,
        commits: AtomicU32,
    }

    #[async_trait]
    impl BookingStore for AlwaysConflicting {
        async fn load(&self, id: BookingId) -> Result<Option<BookingSnapshot>, StoreError> {
            self.inner.load(id).await
        }

        async fn find_by_payment_reference(
            &self,
            method: PaymentMethod,
            reference: &str,
        ) -> Result<Option<BookingId>, StoreError> {
            self.inner.find_by_payment_reference(method, reference).await
        }

        async fn find_paid_payment(
            &self,
            method: PaymentMethod,
            reference: &str,
        ) -> Result<Option<BookingId>, StoreError> {
            self.inner.find_paid_payment(method, reference).await
        }

        async fn commit(&self, commit: BookingCommit) -> Result<Booking, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict(commit.booking.id))
        }

        async fn record_unmatched(&self, event: UnmatchedPaymentEvent) -> Result<bool, StoreError> {
            self.inner.record_unmatched(event).await
        }
    }

    #[tokio::test]
    async fn repeated_conflicts_end_in_busy() {
        let store = Arc::new(AlwaysConflicting {
            inner: InMemoryBookingStore::new(),
            commits: AtomicU32::new(0),
        });
        let booking = Booking::pending(UserId::new(), UserId::new(), test_instant());
        store.inner.insert(booking.clone()).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let env = BookingEnvironment::new(Arc::new(test_clock()), notifier.clone());
        let service = BookingService::new(
            store.clone(),
            env,
            BookingConfig {
                max_commit_attempts: 3,
            },
        );

        let err = service
            .apply_charge(charge_for(&booking, "cs_1"))
            .await
            .unwrap_err();

        assert_eq!(err, BookingError::Busy);
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert!(notifier.sent().is_empty());
    }
}

//! Racing writers against one booking.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::Harness;
use futures::future::join_all;
use tutorhub_marketplace::{
    ChargeOutcome,
    notifications::NotificationKind,
    types::{
        Actor, BookingStatus, ChargeDetails, Money, PaymentMethod, PaymentStatus, Role,
    },
};

fn charge(booking_id: tutorhub_marketplace::types::BookingId, reference: &str) -> ChargeDetails {
    ChargeDetails {
        method: PaymentMethod::Stripe,
        reference: reference.into(),
        booking_id: Some(booking_id),
        amount: Money::new(4200, "usd"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_redeliveries_record_one_payment() {
    let harness = Harness::new();
    let booking = harness.booking(BookingStatus::Pending).await;

    let deliveries = (0..8).map(|_| {
        let service = harness.service.clone();
        let charge = charge(booking.id, "cs_race");
        tokio::spawn(async move { service.apply_charge(charge).await })
    });
    let outcomes: Vec<ChargeOutcome> = join_all(deliveries)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(
        outcomes.iter().filter(|o| **o == ChargeOutcome::Confirmed).count(),
        1
    );
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, ChargeOutcome::Confirmed | ChargeOutcome::Duplicate))
    );

    let payments = harness.store.payments_for(booking.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Paid);

    let stored = harness.store.booking(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(harness.notifier.sent_of_kind(NotificationKind::PaymentReceived).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn charge_racing_a_cancellation_keeps_one_outcome() {
    let harness = Harness::new();
    let booking = harness.booking(BookingStatus::Pending).await;
    let student = Actor::new(booking.student_id, Role::Student);

    let cancel = {
        let service = harness.service.clone();
        tokio::spawn(async move {
            service
                .update_status(student, booking.id, BookingStatus::Cancelled)
                .await
        })
    };
    let pay = {
        let service = harness.service.clone();
        let charge = charge(booking.id, "cs_cancel_race");
        tokio::spawn(async move { service.apply_charge(charge).await })
    };
    let cancelled = cancel.await.unwrap();
    let paid = pay.await.unwrap().unwrap();

    let stored = harness.store.booking(booking.id).await.unwrap();
    let payments = harness.store.payments_for(booking.id).await;
    assert_eq!(payments.len(), 1);

    match paid {
        // Charge committed first: the booking is CONFIRMED, and the student
        // may still cancel it afterwards.
        ChargeOutcome::Confirmed => {
            assert!(cancelled.is_ok());
            assert_eq!(stored.status, BookingStatus::Cancelled);
            assert!(stored.paid_at.is_some());
        },
        // Cancellation committed first: the charge is kept for refund and
        // the booking stays closed.
        ChargeOutcome::Recorded => {
            assert!(cancelled.is_ok());
            assert_eq!(stored.status, BookingStatus::Cancelled);
            assert!(stored.paid_at.is_none());
        },
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_status_changes_apply_once() {
    let harness = Harness::new();
    let booking = harness.booking(BookingStatus::Confirmed).await;
    let student = Actor::new(booking.student_id, Role::Student);
    let tutor = Actor::new(booking.tutor_id, Role::Tutor);

    let requests = [
        (student, BookingStatus::Completed),
        (tutor, BookingStatus::Completed),
        (student, BookingStatus::Cancelled),
        (tutor, BookingStatus::Cancelled),
    ]
    .into_iter()
    .map(|(actor, target)| {
        let service = harness.service.clone();
        tokio::spawn(async move { service.update_status(actor, booking.id, target).await })
    });
    let results: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let stored = harness.store.booking(booking.id).await.unwrap();
    assert!(stored.status.is_terminal());
    assert_eq!(stored.version, booking.version + 1);
}

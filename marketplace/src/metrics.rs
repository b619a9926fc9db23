//! Business metrics for the marketplace.
//!
//! # Exported Metrics
//!
//! - `tutorhub_booking_transitions_total{to}` - Committed status changes by target status
//! - `tutorhub_payments_recorded_total{method,status}` - Payment records written
//! - `tutorhub_webhooks_total{gateway,outcome}` - Webhook deliveries by outcome
//! - `tutorhub_webhooks_unmatched_total{gateway}` - Verified charges that matched no booking
//!
//! Recording is a no-op until a recorder is installed, so tests need no setup.

use crate::types::{BookingStatus, PaymentMethod, PaymentStatus};
use metrics::describe_counter;

/// Register metric descriptions. Call once at startup, after the exporter
/// is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "tutorhub_booking_transitions_total",
        "Committed booking status changes by target status"
    );
    describe_counter!(
        "tutorhub_payments_recorded_total",
        "Payment records written by gateway and status"
    );
    describe_counter!(
        "tutorhub_webhooks_total",
        "Gateway webhook deliveries by outcome"
    );
    describe_counter!(
        "tutorhub_webhooks_unmatched_total",
        "Verified gateway charges that matched no booking"
    );

    tracing::info!("Business metrics registered");
}

/// A booking moved to `to`.
pub fn record_transition(to: BookingStatus) {
    metrics::counter!("tutorhub_booking_transitions_total", "to" => to.as_str()).increment(1);
}

/// A payment record was committed.
pub fn record_payment(method: PaymentMethod, status: PaymentStatus) {
    metrics::counter!(
        "tutorhub_payments_recorded_total",
        "method" => method.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// A webhook delivery finished with `outcome`.
pub fn record_webhook(gateway: PaymentMethod, outcome: &'static str) {
    metrics::counter!(
        "tutorhub_webhooks_total",
        "gateway" => gateway.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// A verified charge matched no booking.
pub fn record_unmatched(gateway: PaymentMethod) {
    metrics::counter!("tutorhub_webhooks_unmatched_total", "gateway" => gateway.as_str())
        .increment(1);
}

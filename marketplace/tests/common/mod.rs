//! Shared fixtures for the marketplace integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use axum::{Json, Router, extract::Query, routing::get};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tutorhub_core::environment::Clock;
use tutorhub_marketplace::{
    AppState, BookingService, Gateways,
    aggregates::BookingEnvironment,
    config::{BookingConfig, FlutterwaveConfig, PaystackConfig, StripeConfig},
    gateways::{FlutterwaveGateway, PaymentGateway, PaystackGateway, StripeGateway},
    notifications::RecordingNotifier,
    store::{InMemoryBookingStore, InMemorySessionStore},
    types::{Actor, Booking, BookingStatus, Role, UserId},
};
use tutorhub_testing::{init_test_tracing, test_clock, test_instant};

pub const STRIPE_SECRET: &str = "whsec_integration";
pub const FLUTTERWAVE_HASH: &str = "flw-integration-hash";
pub const PAYSTACK_SECRET: &str = "sk_test_integration";

/// In-memory wiring of the whole service.
pub struct Harness {
    pub store: Arc<InMemoryBookingStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: BookingService,
    pub gateways: Gateways,
}

impl Harness {
    /// Service with Stripe and Paystack enabled, Flutterwave disabled.
    pub fn new() -> Self {
        Self::with_flutterwave_api(None)
    }

    /// Same, with Flutterwave verifying against `api_base` when given.
    pub fn with_flutterwave_api(api_base: Option<String>) -> Self {
        init_test_tracing();
        let store = Arc::new(InMemoryBookingStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let env = BookingEnvironment::new(clock.clone(), notifier.clone());
        let service = BookingService::new(store.clone(), env, BookingConfig::default());

        let http = reqwest::Client::new();
        let stripe = StripeGateway::from_config(
            &StripeConfig {
                secret_key: None,
                webhook_secret: Some(STRIPE_SECRET.into()),
                signature_tolerance_secs: 300,
                api_base: "http://127.0.0.1:9".into(),
            },
            http.clone(),
            clock,
        )
        .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>);
        let flutterwave = api_base.and_then(|api_base| {
            FlutterwaveGateway::from_config(
                &FlutterwaveConfig {
                    secret_key: Some("FLWSECK_TEST".into()),
                    webhook_hash: Some(FLUTTERWAVE_HASH.into()),
                    api_base,
                },
                http.clone(),
            )
            .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>)
        });
        let paystack = PaystackGateway::from_config(
            &PaystackConfig {
                secret_key: Some(PAYSTACK_SECRET.into()),
                api_base: "http://127.0.0.1:9".into(),
            },
            http,
        )
        .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>);

        Self {
            store,
            sessions,
            notifier,
            service,
            gateways: Gateways {
                stripe,
                flutterwave,
                paystack,
            },
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.service.clone(), self.sessions.clone(), self.gateways.clone())
    }

    pub fn router(&self) -> Router {
        tutorhub_marketplace::build_router(self.state())
    }

    /// Seed a booking in `status`.
    pub async fn booking(&self, status: BookingStatus) -> Booking {
        let mut booking = Booking::pending(UserId::new(), UserId::new(), test_instant());
        booking.status = status;
        self.store.insert(booking.clone()).await;
        booking
    }

    /// Seed a PENDING booking whose charge is recorded but which never moved.
    pub async fn stuck_paid_booking(&self) -> Booking {
        let mut booking = Booking::pending(UserId::new(), UserId::new(), test_instant());
        booking.paid_at = Some(test_instant());
        booking.payment_method = Some(tutorhub_marketplace::types::PaymentMethod::Stripe);
        booking.payment_reference = Some("cs_stuck".into());
        self.store.insert(booking.clone()).await;
        booking
    }

    /// Register a session and return its bearer token.
    pub async fn login(&self, user_id: UserId, role: Role) -> String {
        let token = format!("sess_{}", uuid::Uuid::new_v4().simple());
        self.sessions
            .insert(&token, Actor::new(user_id, role), Utc::now() + Duration::hours(1))
            .await;
        token
    }
}

/// A Stripe `checkout.session.completed` body for `booking`.
pub fn stripe_completed(booking: &Booking, session_id: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_status": "paid",
            "amount_total": amount,
            "currency": "usd",
            "metadata": { "bookingId": booking.id.to_string() }
        }}
    }))
    .unwrap()
}

/// `Stripe-Signature` value for `body`, signed now.
pub fn stripe_signature(body: &[u8]) -> String {
    tutorhub_marketplace::gateways::stripe::sign_payload(
        STRIPE_SECRET,
        test_instant().timestamp(),
        body,
    )
    .unwrap()
}

/// Serve a fake Flutterwave verification API; `transactions` maps `tx_ref`
/// to the `data` object it reports. Returns the base URL.
pub async fn fake_flutterwave_api(transactions: HashMap<String, Value>) -> String {
    let transactions = Arc::new(transactions);
    let app = Router::new().route(
        "/v3/transactions/verify_by_reference",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let transactions = Arc::clone(&transactions);
            async move {
                let found = query.get("tx_ref").and_then(|r| transactions.get(r)).cloned();
                Json(match found {
                    Some(data) => json!({ "status": "success", "message": "Transaction fetched", "data": data }),
                    None => json!({ "status": "error", "message": "No transaction was found", "data": null }),
                })
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

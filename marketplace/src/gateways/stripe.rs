//! Stripe Checkout.
//!
//! Webhooks carry `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`, where
//! each `v1` is the HMAC-SHA256 of `"{t}.{raw body}"` under the endpoint's
//! signing secret. Deliveries older than the tolerance are refused to stop
//! replays. The booking id travels in the Checkout Session metadata.

use super::{
    GatewayError, PaymentGateway, TransactionVerification, WebhookEvent, ensure_success, header,
    hmac_sha256_hex, signatures_match, transport,
};
use crate::config::StripeConfig;
use crate::types::{BookingId, ChargeDetails, Money, PaymentMethod};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tutorhub_core::environment::Clock;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl CheckoutSession {
    fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    fn charge(&self) -> ChargeDetails {
        let booking_id = self
            .metadata
            .get("bookingId")
            .or_else(|| self.metadata.get("booking_id"))
            .and_then(|id| uuid::Uuid::parse_str(id).ok())
            .map(BookingId::from_uuid);

        ChargeDetails {
            method: PaymentMethod::Stripe,
            reference: self.id.clone(),
            booking_id,
            amount: Money::new(
                self.amount_total.unwrap_or_default(),
                self.currency.as_deref().unwrap_or("usd"),
            ),
        }
    }
}

/// Stripe Checkout adapter.
pub struct StripeGateway {
    webhook_secret: String,
    secret_key: Option<String>,
    tolerance_secs: i64,
    api_base: String,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl StripeGateway {
    /// Build the adapter, or `None` when no webhook secret is configured.
    #[must_use]
    pub fn from_config(
        config: &StripeConfig,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Option<Self> {
        Some(Self {
            webhook_secret: config.webhook_secret.clone()?,
            secret_key: config.secret_key.clone(),
            tolerance_secs: config.signature_tolerance_secs,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
            clock,
        })
    }

    fn verify_signature(&self, body: &[u8], signature_header: &str) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {},
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| GatewayError::Signature("missing timestamp in Stripe-Signature".into()))?;
        if candidates.is_empty() {
            return Err(GatewayError::Signature("no v1 signature in Stripe-Signature".into()));
        }

        let age = (self.clock.now().timestamp() - timestamp).abs();
        if age > self.tolerance_secs {
            return Err(GatewayError::Signature(format!(
                "timestamp is {age}s away from now, tolerance is {}s",
                self.tolerance_secs
            )));
        }

        let mut signed = format!("{timestamp}.").into_bytes();
        signed.extend_from_slice(body);
        let expected = hmac_sha256_hex(self.webhook_secret.as_bytes(), &signed)?;

        if candidates.iter().any(|candidate| signatures_match(&expected, candidate)) {
            Ok(())
        } else {
            Err(GatewayError::Signature("signature mismatch".into()))
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    fn parse_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, GatewayError> {
        let signature = header(headers, SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::Signature("missing Stripe-Signature header".into()))?;
        self.verify_signature(body, signature)?;

        let event: StripeEvent =
            serde_json::from_slice(body).map_err(|e| GatewayError::Payload(e.to_string()))?;

        let session = || -> Result<CheckoutSession, GatewayError> {
            serde_json::from_value(event.data.object.clone())
                .map_err(|e| GatewayError::Payload(format!("checkout session: {e}")))
        };

        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session = session()?;
                if session.is_paid() {
                    Ok(WebhookEvent::ChargeSucceeded(session.charge()))
                } else {
                    // Delayed methods settle later through async_payment_* events.
                    Ok(WebhookEvent::Ignored {
                        event_type: event.event_type.clone(),
                    })
                }
            },
            "checkout.session.async_payment_succeeded" => {
                Ok(WebhookEvent::ChargeSucceeded(session()?.charge()))
            },
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                Ok(WebhookEvent::ChargeFailed(session()?.charge()))
            },
            _ => Ok(WebhookEvent::Ignored {
                event_type: event.event_type.clone(),
            }),
        }
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or_else(|| GatewayError::Rejected("Stripe secret key is not configured".into()))?;

        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{reference}", self.api_base))
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let session: CheckoutSession = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Payload(e.to_string()))?;

        Ok(TransactionVerification {
            success: session.is_paid(),
            amount: session.charge().amount,
            reference: session.id,
        })
    }
}

/// Sign `body` the way Stripe does, for tests and local tooling.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] if the secret is unusable.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, GatewayError> {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);
    let signature = hmac_sha256_hex(secret.as_bytes(), &signed)?;
    Ok(format!("t={timestamp},v1={signature}"))
}

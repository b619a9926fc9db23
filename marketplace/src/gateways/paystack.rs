//! Paystack.
//!
//! `x-paystack-signature` is the hex HMAC-SHA512 of the raw body under the
//! secret key. Amounts are already in the currency's minor unit (kobo).

use super::{
    GatewayError, PaymentGateway, TransactionVerification, WebhookEvent, ensure_success, header,
    hmac_sha512_hex, signatures_match, transport,
};
use crate::config::PaystackConfig;
use crate::types::{BookingId, ChargeDetails, Money, PaymentMethod};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;

const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Deserialize)]
struct PaystackEvent {
    event: String,
    #[serde(default)]
    data: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl Transaction {
    fn booking_id(&self) -> Option<BookingId> {
        let metadata = self.metadata.as_ref()?;
        metadata
            .get("bookingId")
            .or_else(|| metadata.get("booking_id"))
            .and_then(serde_json::Value::as_str)
            .and_then(|id| uuid::Uuid::parse_str(id).ok())
            .map(BookingId::from_uuid)
    }

    fn charge(&self) -> ChargeDetails {
        ChargeDetails {
            method: PaymentMethod::Paystack,
            reference: self.reference.clone(),
            booking_id: self.booking_id(),
            amount: Money::new(self.amount, &self.currency),
        }
    }

    fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<Transaction>,
}

/// Paystack adapter.
pub struct PaystackGateway {
    secret_key: String,
    api_base: String,
    http: reqwest::Client,
}

impl PaystackGateway {
    /// Build the adapter, or `None` when no secret key is configured.
    #[must_use]
    pub fn from_config(config: &PaystackConfig, http: reqwest::Client) -> Option<Self> {
        Some(Self {
            secret_key: config.secret_key.clone()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paystack
    }

    fn parse_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, GatewayError> {
        let provided = header(headers, SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::Signature("missing x-paystack-signature header".into()))?;
        let expected = hmac_sha512_hex(self.secret_key.as_bytes(), body)?;
        if !signatures_match(&expected, provided) {
            return Err(GatewayError::Signature("signature mismatch".into()));
        }

        let event: PaystackEvent =
            serde_json::from_slice(body).map_err(|e| GatewayError::Payload(e.to_string()))?;

        let data = match (event.event.as_str(), event.data) {
            ("charge.success", Some(data)) => data,
            ("charge.success", None) => {
                return Err(GatewayError::Payload("charge.success without data".into()));
            },
            (_, _) => {
                return Ok(WebhookEvent::Ignored {
                    event_type: event.event,
                });
            },
        };

        Ok(WebhookEvent::ChargeSucceeded(data.charge()))
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{reference}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let body: VerifyResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Payload(e.to_string()))?;

        let data = match body.data {
            Some(data) if body.status => data,
            _ => {
                return Err(GatewayError::Rejected(
                    body.message.unwrap_or_else(|| "transaction not found".into()),
                ));
            },
        };

        Ok(TransactionVerification {
            success: data.succeeded(),
            amount: Money::new(data.amount, &data.currency),
            reference: data.reference,
        })
    }

    fn verifies_before_trust(&self) -> bool {
        true
    }
}

/// Sign `body` the way Paystack does, for tests and local tooling.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] if the secret is unusable.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, GatewayError> {
    hmac_sha512_hex(secret.as_bytes(), body)
}

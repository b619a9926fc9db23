//! Flutterwave Standard.
//!
//! Flutterwave echoes the dashboard's secret hash in the `verif-hash`
//! header; there is no body signature. A `charge.completed` webhook is
//! therefore only trusted after asking the API about the `tx_ref`.
//! Amounts are reported in major units.

use super::{
    GatewayError, PaymentGateway, TransactionVerification, WebhookEvent, ensure_success, header,
    transport,
};
use crate::config::FlutterwaveConfig;
use crate::types::{ChargeDetails, Money, PaymentMethod};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;

const HASH_HEADER: &str = "verif-hash";

#[derive(Debug, Deserialize)]
struct FlutterwaveEvent {
    event: String,
    #[serde(default)]
    data: Option<ChargeData>,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    tx_ref: String,
    amount: f64,
    currency: String,
    status: String,
}

impl ChargeData {
    fn charge(&self) -> Result<ChargeDetails, GatewayError> {
        let amount = Money::from_major_units(self.amount, &self.currency)
            .ok_or_else(|| GatewayError::Payload(format!("unusable amount {}", self.amount)))?;
        Ok(ChargeDetails {
            method: PaymentMethod::Flutterwave,
            reference: self.tx_ref.clone(),
            booking_id: None,
            amount,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<ChargeData>,
}

/// Flutterwave adapter.
pub struct FlutterwaveGateway {
    webhook_hash: String,
    secret_key: Option<String>,
    api_base: String,
    http: reqwest::Client,
}

impl FlutterwaveGateway {
    /// Build the adapter, or `None` when no webhook hash is configured.
    #[must_use]
    pub fn from_config(config: &FlutterwaveConfig, http: reqwest::Client) -> Option<Self> {
        Some(Self {
            webhook_hash: config.webhook_hash.clone()?,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Flutterwave
    }

    fn parse_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, GatewayError> {
        let provided = header(headers, HASH_HEADER)
            .ok_or_else(|| GatewayError::Signature("missing verif-hash header".into()))?;
        if !constant_time_eq::constant_time_eq(provided.as_bytes(), self.webhook_hash.as_bytes()) {
            return Err(GatewayError::Signature("verif-hash mismatch".into()));
        }

        let event: FlutterwaveEvent =
            serde_json::from_slice(body).map_err(|e| GatewayError::Payload(e.to_string()))?;

        if event.event != "charge.completed" {
            return Ok(WebhookEvent::Ignored {
                event_type: event.event,
            });
        }

        let data = event
            .data
            .ok_or_else(|| GatewayError::Payload("charge.completed without data".into()))?;
        let charge = data.charge()?;

        if data.status.eq_ignore_ascii_case("successful") {
            Ok(WebhookEvent::ChargeSucceeded(charge))
        } else {
            Ok(WebhookEvent::ChargeFailed(charge))
        }
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            GatewayError::Rejected("Flutterwave secret key is not configured".into())
        })?;

        let response = self
            .http
            .get(format!("{}/v3/transactions/verify_by_reference", self.api_base))
            .query(&[("tx_ref", reference)])
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let body: VerifyResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Payload(e.to_string()))?;

        let data = match body.data {
            Some(data) if body.status == "success" => data,
            _ => {
                return Err(GatewayError::Rejected(
                    body.message.unwrap_or_else(|| "transaction not found".into()),
                ));
            },
        };

        Ok(TransactionVerification {
            success: data.status.eq_ignore_ascii_case("successful"),
            amount: data.charge()?.amount,
            reference: data.tx_ref,
        })
    }

    fn verifies_before_trust(&self) -> bool {
        true
    }
}

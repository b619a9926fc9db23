//! Payment gateway adapters.
//!
//! Each adapter turns a raw webhook delivery into a [`WebhookEvent`] after
//! checking its signature, and can ask the gateway directly whether a
//! transaction succeeded. Nothing in a webhook body is read before the
//! signature verifies.

use crate::error::BookingError;
use crate::types::{ChargeDetails, Money, PaymentMethod};
use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

pub mod flutterwave;
pub mod paystack;
pub mod stripe;

pub use flutterwave::FlutterwaveGateway;
pub use paystack::PaystackGateway;
pub use stripe::StripeGateway;

/// A verified webhook, normalized across gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// The charge was captured
    ChargeSucceeded(ChargeDetails),
    /// The charge failed or expired
    ChargeFailed(ChargeDetails),
    /// Correctly signed, but not an event the booking core acts on
    Ignored {
        /// Gateway event type
        event_type: String,
    },
}

/// Server-side view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionVerification {
    /// The gateway reports the transaction as paid
    pub success: bool,
    /// Amount the gateway captured
    pub amount: Money,
    /// Transaction reference the gateway answered for
    pub reference: String,
}

impl TransactionVerification {
    /// Whether this verification backs up `charge`: paid, same reference,
    /// same amount and currency.
    #[must_use]
    pub fn confirms(&self, charge: &ChargeDetails) -> bool {
        self.success && self.reference == charge.reference && self.amount == charge.amount
    }
}

/// Gateway failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing, malformed or mismatching signature
    #[error("invalid signature: {0}")]
    Signature(String),

    /// Signed body that does not parse
    #[error("invalid payload: {0}")]
    Payload(String),

    /// The gateway API could not be reached
    #[error("gateway request failed: {0}")]
    Transport(String),

    /// The gateway API answered with an error
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Signature(message) => Self::Signature(message),
            GatewayError::Payload(message) => Self::Validation(message),
            GatewayError::Transport(_) | GatewayError::Rejected(_) => {
                Self::Gateway(err.to_string())
            },
        }
    }
}

/// A payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Method recorded on payments from this gateway.
    fn method(&self) -> PaymentMethod;

    /// Verify the signature of a webhook delivery and parse it.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Signature`] when the signature is missing or wrong
    /// - [`GatewayError::Payload`] when the signed body is not understood
    fn parse_webhook(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, GatewayError>;

    /// Ask the gateway for the state of `reference`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] or [`GatewayError::Rejected`] when the
    /// API call fails.
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError>;

    /// Whether a successful webhook must be confirmed with
    /// [`PaymentGateway::verify_transaction`] before it is trusted.
    fn verifies_before_trust(&self) -> bool {
        false
    }
}

/// Read a header as UTF-8.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String, GatewayError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| GatewayError::Signature(format!("unusable signing secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn hmac_sha512_hex(secret: &[u8], payload: &[u8]) -> Result<String, GatewayError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret)
        .map_err(|e| GatewayError::Signature(format!("unusable signing secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of two signatures.
fn signatures_match(expected: &str, provided: &str) -> bool {
    constant_time_eq::constant_time_eq(expected.as_bytes(), provided.to_ascii_lowercase().as_bytes())
}

/// Map a failed `reqwest` call.
fn transport(e: &reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

/// Turn a non-2xx response into [`GatewayError::Rejected`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Rejected(format!("HTTP {status}: {body}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::http::{HeaderMap, HeaderName, HeaderValue};

    /// Header map from literal pairs.
    pub fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(value) {
                map.insert(HeaderName::from_static(name), value);
            }
        }
        map
    }
}

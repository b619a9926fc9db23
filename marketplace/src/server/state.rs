//! Application state shared by every handler.

use crate::app::BookingService;
use crate::gateways::PaymentGateway;
use crate::store::SessionStore;
use std::sync::Arc;

/// Configured payment gateways. A gateway without secrets is `None` and its
/// webhook route answers 503.
#[derive(Clone, Default)]
pub struct Gateways {
    /// Stripe Checkout
    pub stripe: Option<Arc<dyn PaymentGateway>>,
    /// Flutterwave Standard
    pub flutterwave: Option<Arc<dyn PaymentGateway>>,
    /// Paystack
    pub paystack: Option<Arc<dyn PaymentGateway>>,
}

impl Gateways {
    /// Names of the enabled gateways, for the startup log.
    #[must_use]
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            ("stripe", self.stripe.is_some()),
            ("flutterwave", self.flutterwave.is_some()),
            ("paystack", self.paystack.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect()
    }
}

/// State cloned into each request (everything behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Booking commands and queries
    pub bookings: BookingService,
    /// Bearer session lookup
    pub sessions: Arc<dyn SessionStore>,
    /// Webhook adapters
    pub gateways: Gateways,
}

impl AppState {
    /// Creates a new `AppState`
    #[must_use]
    pub fn new(bookings: BookingService, sessions: Arc<dyn SessionStore>, gateways: Gateways) -> Self {
        Self {
            bookings,
            sessions,
            gateways,
        }
    }
}

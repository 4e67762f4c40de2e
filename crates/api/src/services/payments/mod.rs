//! Payment gateways.
//!
//! Two shapes of gateway are supported:
//!
//! - [`CheckoutGateway`] - hosted checkout pages (Stripe). The client is
//!   redirected and later reports the outcome itself.
//! - [`OrderGateway`] - gateway-side orders (Razorpay). The gateway is asked
//!   for the order's status, so its answer is authoritative.
//!
//! Both are optional at runtime; see [`crate::config::PaymentsConfig`].

mod razorpay;
mod stripe;

pub use razorpay::RazorpayClient;
pub use stripe::StripeClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use merkato_core::Currency;

/// Errors from a payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("payment request failed: {0}")]
    Request(String),

    /// The gateway rejected the call.
    #[error("payment gateway error: {0}")]
    Api(String),

    /// Failed to parse response.
    #[error("payment response error: {0}")]
    Response(String),

    /// An amount cannot be expressed in minor units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// One priced line on a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    /// Unit price in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
}

/// A hosted checkout session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub currency: Currency,
    pub lines: Vec<CheckoutLine>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Hosted checkout (Stripe Checkout Sessions).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Create a session and return the URL to redirect the buyer to.
    async fn create_session(&self, request: CheckoutRequest) -> Result<String, PaymentError>;
}

/// An order as held by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    /// Our order id.
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`.
    pub status: String,
}

impl GatewayOrder {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

/// Gateway-side orders (Razorpay Orders).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Create a gateway order for `amount` minor units with our order id as
    /// the receipt.
    async fn create_order(
        &self,
        amount: i64,
        currency: Currency,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError>;

    async fn fetch_order(&self, id: &str) -> Result<GatewayOrder, PaymentError>;
}

//! Stripe Checkout Sessions client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{CheckoutGateway, CheckoutRequest, PaymentError};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            secret_key,
        }
    }
}

/// Form fields for a payment-mode checkout session.
fn session_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, line) in request.lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.code().to_string(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }

    form
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    #[instrument(skip(self, request), fields(lines = request.lines.len()))]
    async fn create_session(&self, request: CheckoutRequest) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/checkout/sessions"))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&session_form(&request))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let error: ErrorResponse = response
                .json()
                .await
                .map_err(|e| PaymentError::Response(e.to_string()))?;
            return Err(PaymentError::Api(error.error.message));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Response(e.to_string()))?;

        debug!(session_id = %session.id, "Stripe checkout session created");
        session
            .url
            .ok_or_else(|| PaymentError::Response("session has no url".to_string()))
    }
}

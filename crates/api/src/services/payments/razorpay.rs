//! Razorpay Orders client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use merkato_core::Currency;

use super::{GatewayOrder, OrderGateway, PaymentError};
use crate::config::RazorpayConfig;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Serialize)]
struct CreateOrder<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    description: String,
}

/// Razorpay API client, authenticated with key id and secret.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: SecretString,
}

impl std::fmt::Debug for RazorpayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayClient")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RazorpayClient {
    #[must_use]
    pub fn new(config: &RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        }
    }

    async fn parse(response: reqwest::Response) -> Result<GatewayOrder, PaymentError> {
        if !response.status().is_success() {
            let error: ErrorResponse = response
                .json()
                .await
                .map_err(|e| PaymentError::Response(e.to_string()))?;
            return Err(PaymentError::Api(error.error.description));
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Response(e.to_string()))
    }
}

#[async_trait]
impl OrderGateway for RazorpayClient {
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        amount: i64,
        currency: Currency,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError> {
        let body = CreateOrder {
            amount,
            currency: currency.upper_code(),
            receipt,
        };

        let response = self
            .client
            .post(format!("{RAZORPAY_API_BASE}/orders"))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let order = Self::parse(response).await?;
        debug!(gateway_order = %order.id, "Razorpay order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn fetch_order(&self, id: &str) -> Result<GatewayOrder, PaymentError> {
        let response = self
            .client
            .get(format!("{RAZORPAY_API_BASE}/orders/{id}"))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        Self::parse(response).await
    }
}

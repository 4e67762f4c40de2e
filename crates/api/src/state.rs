//! Application state shared across handlers.

use std::sync::Arc;

use lettre::transport::smtp::Error as SmtpError;

use crate::config::ApiConfig;
use crate::db::Repositories;
use crate::error::AppError;
use crate::services::email::{Mailer, SmtpMailer};
use crate::services::images::{CloudinaryClient, ImageStore};
use crate::services::payments::{CheckoutGateway, OrderGateway, RazorpayClient, StripeClient};
use crate::services::tokens::SessionTokens;

/// External services the API calls out to.
///
/// Built once at startup; tests swap in fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageStore>,
    pub checkout: Option<Arc<dyn CheckoutGateway>>,
    pub order_gateway: Option<Arc<dyn OrderGateway>>,
}

impl Collaborators {
    /// Production clients for everything configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay cannot be configured.
    pub fn from_config(config: &ApiConfig) -> Result<Self, SmtpError> {
        let checkout = config
            .payments
            .stripe_secret_key
            .clone()
            .map(|key| Arc::new(StripeClient::new(key)) as Arc<dyn CheckoutGateway>);
        let order_gateway = config
            .payments
            .razorpay
            .as_ref()
            .map(|razorpay| Arc::new(RazorpayClient::new(razorpay)) as Arc<dyn OrderGateway>);

        Ok(Self {
            mailer: Arc::new(SmtpMailer::new(&config.email)?),
            images: Arc::new(CloudinaryClient::new(&config.cloudinary)),
            checkout,
            order_gateway,
        })
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the stores, the token signer and the external collaborators.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    repos: Repositories,
    tokens: SessionTokens,
    collaborators: Collaborators,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ApiConfig, repos: Repositories, collaborators: Collaborators) -> Self {
        let tokens = SessionTokens::new(config.session.secret.clone(), config.session.ttl);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repos,
                tokens,
                collaborators,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.inner.tokens
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.collaborators.mailer.as_ref()
    }

    #[must_use]
    pub fn images(&self) -> &dyn ImageStore {
        self.inner.collaborators.images.as_ref()
    }

    /// The hosted-checkout gateway.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Dependency` if Stripe is not configured.
    pub fn checkout(&self) -> Result<&dyn CheckoutGateway, AppError> {
        self.inner
            .collaborators
            .checkout
            .as_deref()
            .ok_or_else(|| AppError::Dependency("Stripe is not configured".to_string()))
    }

    /// The gateway-order gateway.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Dependency` if Razorpay is not configured.
    pub fn order_gateway(&self) -> Result<&dyn OrderGateway, AppError> {
        self.inner
            .collaborators
            .order_gateway
            .as_deref()
            .ok_or_else(|| AppError::Dependency("Razorpay is not configured".to_string()))
    }
}

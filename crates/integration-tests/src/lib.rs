//! In-process integration tests for the Merkato API.
//!
//! Every test builds the full router over the in-memory store and drives it
//! with `tower::ServiceExt::oneshot`, so no database, SMTP relay or payment
//! gateway is needed:
//!
//! ```bash
//! cargo test -p merkato-integration-tests
//! ```
//!
//! Mail, image hosting and both payment gateways are replaced by the fakes
//! in this crate. Sent verification links are captured so tests can walk the
//! whole register, verify and login flow.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use merkato_api::config::{
    AdminCredentials, ApiConfig, CloudinaryConfig, EmailConfig, LogFormat, PaymentsConfig,
    SessionConfig, StoreBackend,
};
use merkato_api::db::{Repositories, UserStore};
use merkato_api::services::email::{MailError, Mailer};
use merkato_api::services::images::{ImageStore, ImageUpload, UploadError};
use merkato_api::services::payments::{
    CheckoutGateway, CheckoutRequest, GatewayOrder, OrderGateway, PaymentError,
};
use merkato_api::state::{AppState, Collaborators};
use merkato_core::{Currency, Email, UserId};

pub const ADMIN_EMAIL: &str = "ops@merkato.test";
pub const ADMIN_PASSWORD: &str = "operator-password";
pub const FRONTEND_URL: &str = "https://shop.merkato.test";
pub const PASSWORD: &str = "correct-horse-battery";

/// Captures verification links instead of mailing them.
#[derive(Default)]
pub struct CapturingMailer {
    links: Mutex<Vec<(String, String)>>,
}

impl CapturingMailer {
    /// The last link sent to `email`.
    pub fn link_for(&self, email: &str) -> Option<String> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, link)| link.clone())
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send_verification(&self, to: &Email, _name: &str, link: &str) -> Result<(), MailError> {
        self.links
            .lock()
            .unwrap()
            .push((to.to_string(), link.to_string()));
        Ok(())
    }
}

/// Hands out predictable image URLs.
pub struct FakeImages;

#[async_trait]
impl ImageStore for FakeImages {
    async fn upload(&self, image: ImageUpload) -> Result<String, UploadError> {
        Ok(format!("https://img.merkato.test/{}", image.file_name))
    }
}

/// Records checkout requests and returns a fixed session URL.
#[derive(Default)]
pub struct FakeCheckout {
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl CheckoutGateway for FakeCheckout {
    async fn create_session(&self, request: CheckoutRequest) -> Result<String, PaymentError> {
        self.requests.lock().unwrap().push(request);
        Ok("https://checkout.stripe.test/session".to_string())
    }
}

/// Keeps gateway orders in memory; `settle` flips one to paid.
#[derive(Default)]
pub struct FakeOrderGateway {
    orders: Mutex<Vec<GatewayOrder>>,
}

impl FakeOrderGateway {
    pub fn settle(&self, id: &str) {
        for order in self.orders.lock().unwrap().iter_mut() {
            if order.id == id {
                order.status = "paid".to_string();
            }
        }
    }
}

#[async_trait]
impl OrderGateway for FakeOrderGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: Currency,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError> {
        let mut orders = self.orders.lock().unwrap();
        let order = GatewayOrder {
            id: format!("order_{}", orders.len() + 1),
            amount,
            currency: currency.upper_code().to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".to_string(),
        };
        orders.push(order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, id: &str) -> Result<GatewayOrder, PaymentError> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|order| order.id == id)
            .cloned()
            .ok_or_else(|| PaymentError::Api(format!("no order {id}")))
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        store: StoreBackend::Memory,
        host: [127, 0, 0, 1].into(),
        port: 0,
        frontend_url: FRONTEND_URL.to_string(),
        session: SessionConfig {
            secret: SecretString::from("kJ8#mQ2$vX9@pL5!nR7&wT3*zY6^bH4%".to_string()),
            ttl: None,
        },
        admin: AdminCredentials {
            email: ADMIN_EMAIL.to_string(),
            password: SecretString::from(ADMIN_PASSWORD.to_string()),
        },
        email: EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            smtp_username: String::new(),
            smtp_password: SecretString::from(String::new()),
            from_address: "no-reply@merkato.test".to_string(),
        },
        cloudinary: CloudinaryConfig {
            cloud_name: "merkato-test".to_string(),
            api_key: "key".to_string(),
            api_secret: SecretString::from("secret".to_string()),
        },
        payments: PaymentsConfig {
            currency: Currency::Etb,
            delivery_charge: Decimal::from(10),
            stripe_secret_key: None,
            razorpay: None,
        },
        sentry_dsn: None,
        sentry_environment: None,
        log_format: LogFormat::Pretty,
        rate_limit: false,
    }
}

/// A response as seen by a client.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// A full application over the in-memory store with fake collaborators.
pub struct TestContext {
    pub app: Router,
    pub repos: Repositories,
    pub mailer: Arc<CapturingMailer>,
    pub checkout: Arc<FakeCheckout>,
    pub gateway: Arc<FakeOrderGateway>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let repos = Repositories::in_memory();
        let mailer = Arc::new(CapturingMailer::default());
        let checkout = Arc::new(FakeCheckout::default());
        let gateway = Arc::new(FakeOrderGateway::default());

        let collaborators = Collaborators {
            mailer: mailer.clone(),
            images: Arc::new(FakeImages),
            checkout: Some(checkout.clone()),
            order_gateway: Some(gateway.clone()),
        };
        let state = AppState::new(test_config(), repos.clone(), collaborators);

        Self {
            app: merkato_api::app(state),
            repos,
            mailer,
            checkout,
            gateway,
        }
    }

    /// Send a request with an optional JSON body and bearer token.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.dispatch(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Send an already-built request.
    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse { status, body }
    }

    /// Register an account without verifying it.
    pub async fn register(&self, name: &str, email: &str) -> TestResponse {
        self.post(
            "/api/user/register",
            None,
            serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
        )
        .await
    }

    /// Follow the captured verification link for `email`.
    pub async fn verify(&self, email: &str) -> TestResponse {
        let link = self.mailer.link_for(email).expect("verification mail sent");
        let token = link.rsplit('/').next().unwrap();
        self.get(&format!("/api/user/verify-email/{token}"), None)
            .await
    }

    pub async fn login(&self, email: &str) -> TestResponse {
        self.post(
            "/api/user/login",
            None,
            serde_json::json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    /// Register, verify and log in; returns the user id and session token.
    pub async fn buyer(&self, name: &str, email: &str) -> (UserId, String) {
        assert_eq!(self.register(name, email).await.status, StatusCode::OK);
        assert_eq!(self.verify(email).await.status, StatusCode::OK);
        let login = self.login(email).await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);

        let id = serde_json::from_value(login.body["user"]["id"].clone()).unwrap();
        let token = login.body["token"].as_str().unwrap().to_string();
        (id, token)
    }

    /// As [`Self::buyer`], with the seller flag set.
    pub async fn seller(&self, name: &str, email: &str) -> (UserId, String) {
        let (id, token) = self.buyer(name, email).await;
        self.repos.users.set_seller(id, true).await.unwrap();
        (id, token)
    }

    pub async fn admin_token(&self) -> String {
        let response = self
            .post(
                "/api/user/admin",
                None,
                serde_json::json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    /// List a product through the seller's multipart form; returns its id.
    pub async fn list_product(&self, token: &str, name: &str, price: &str, original: &str) -> i64 {
        let fields = [
            ("name", name),
            ("description", "Handwoven cotton"),
            ("price", price),
            ("original_price", original),
            ("department", "Women"),
            ("category", "Clothing"),
            ("subCategory", "Dresses"),
            ("sizes", r#"["S","M","L"]"#),
            ("bestseller", "false"),
        ];
        let request = multipart_request("/api/product/user/add", token, &fields, Some("dress.jpg"));
        let response = self.dispatch(request).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["product"]["_id"].as_i64().unwrap()
    }
}

const BOUNDARY: &str = "merkato-test-boundary";

/// A multipart product form, with one image file when `image_name` is set.
#[must_use]
pub fn multipart_request(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    image_name: Option<&str>,
) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some(image_name) = image_name {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image1\"; filename=\"{image_name}\"\r\nContent-Type: image/jpeg\r\n\r\nnot-really-a-jpeg\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

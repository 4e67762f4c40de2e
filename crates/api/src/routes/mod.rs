//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Store reachable
//!
//! # Users
//! POST   /api/user/register                 - Register, mails a verification link
//! POST   /api/user/login                    - Buyer/seller login (rate limited)
//! POST   /api/user/admin                    - Operator login (rate limited)
//! GET    /api/user/verify-email/{token}     - Consume a verification token
//! GET    /api/user/profile                  - Own profile (user)
//! PUT    /api/user/profile                  - Update payout details (user)
//! GET    /api/user/all                      - All users (admin)
//! DELETE /api/user/{userId}                 - Delete user and their products (admin)
//! PUT    /api/user/{userId}/seller          - Grant or revoke seller (admin)
//!
//! # Products
//! POST   /api/product/add                   - Add for a seller, multipart (admin)
//! POST   /api/product/remove                - Remove any product (admin)
//! GET    /api/product/list-by-user/{userId} - A seller's products (admin)
//! POST   /api/product/single                - One product
//! GET    /api/product/list                  - Whole catalog
//! POST   /api/product/user/add              - Add own product, multipart (seller)
//! GET    /api/product/user/list             - Own products (seller)
//! PUT    /api/product/user/update/{id}      - Update own product (seller)
//! DELETE /api/product/user/delete/{id}      - Delete own product (seller)
//!
//! # Cart (user)
//! POST /api/cart/add, /api/cart/update      - Change one slot
//! GET  /api/cart/get                        - Cart and summary
//!
//! # Orders
//! POST /api/order/place                     - Cash on delivery (user)
//! POST /api/order/stripe                    - Hosted checkout (user)
//! POST /api/order/razorpay                  - Gateway order (user)
//! POST /api/order/verifyStripe              - Client-reported outcome (user)
//! POST /api/order/verifyRazorpay            - Gateway-confirmed outcome (user)
//! GET  /api/order/userorders                - Own orders (user)
//! GET  /api/order/seller                    - Orders with own products (seller)
//! GET  /api/order/list                      - All orders (admin)
//! POST /api/order/status                    - Advance status (admin)
//!
//! # Reviews (user)
//! POST /api/review/submit                   - Redeem a review token
//! GET  /api/review/list                     - Lines still reviewable
//! ```

pub mod cart;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod users;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::{HeaderMap, StatusCode, header::ORIGIN},
    routing::get,
};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::rate_limit::RateLimiterLayer;
use crate::state::AppState;

/// JSON body extractor whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path extractor whose rejections use the API error shape.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Successful response body: `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// Wrap `body` as a successful JSON response.
pub const fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

/// Body carrying only a human-readable message.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Where the client should be sent back to after a hosted checkout.
///
/// The request `Origin` is used when it is an absolute http(s) URL;
/// anything else falls back to the configured storefront URL.
fn redirect_origin(headers: &HeaderMap, frontend_url: &str) -> String {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| url::Url::parse(v).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .map_or_else(
            || frontend_url.trim_end_matches('/').to_string(),
            |url| url.origin().ascii_serialization(),
        )
}

/// Create the `/api` routes.
///
/// `credentials_limiter` wraps login, registration and admin login.
pub fn routes(credentials_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    Router::new()
        .nest("/user", users::routes(credentials_limiter))
        .nest("/product", products::routes())
        .nest("/cart", cart::routes())
        .nest("/order", orders::routes())
        .nest("/review", reviews::routes())
}

/// Health endpoints, outside `/api`.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.repos().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_redirect_origin() {
        let fallback = "https://merkato.et/";

        let mut headers = HeaderMap::new();
        assert_eq!(redirect_origin(&headers, fallback), "https://merkato.et");

        headers.insert(ORIGIN, HeaderValue::from_static("http://localhost:5173"));
        assert_eq!(redirect_origin(&headers, fallback), "http://localhost:5173");

        headers.insert(ORIGIN, HeaderValue::from_static("null"));
        assert_eq!(redirect_origin(&headers, fallback), "https://merkato.et");

        headers.insert(ORIGIN, HeaderValue::from_static("javascript:alert(1)"));
        assert_eq!(redirect_origin(&headers, fallback), "https://merkato.et");
    }

    #[test]
    fn test_success_flattens_body() {
        let Json(body) = ok(Message::new("Added to cart"));
        let json = serde_json::to_value(body).expect("serializes");
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Added to cart");
    }
}

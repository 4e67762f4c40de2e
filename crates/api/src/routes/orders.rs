//! Order route handlers: placement, payment verification and status.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::instrument;

use merkato_core::OrderId;

use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireSeller, RequireUser};
use crate::models::{Order, SellerOrder};
use crate::routes::{ApiJson, Message, Success, ok, redirect_origin};
use crate::services::payments::GatewayOrder;
use crate::services::{OrderRequest, OrderService};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/place", post(place_cod))
        .route("/stripe", post(place_stripe))
        .route("/razorpay", post(place_razorpay))
        .route("/verifyStripe", post(verify_stripe))
        .route("/verifyRazorpay", post(verify_razorpay))
        .route("/userorders", get(buyer_orders))
        .route("/seller", get(seller_orders))
        .route("/list", get(all_orders))
        .route("/status", post(update_status))
}

fn order_service(state: &AppState) -> OrderService<'_> {
    let repos = state.repos();
    OrderService::new(
        repos.orders.as_ref(),
        repos.products.as_ref(),
        repos.users.as_ref(),
        &state.config().payments,
    )
}

#[derive(Debug, Serialize)]
pub struct PlacedResponse {
    pub message: &'static str,
    pub order: Order,
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
async fn place_cod(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<OrderRequest>,
) -> Result<Json<Success<PlacedResponse>>, AppError> {
    let order = order_service(&state).place_cod(user.id, request).await?;
    Ok(ok(PlacedResponse {
        message: "Order placed",
        order,
    }))
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_url: String,
}

#[instrument(skip(state, user, headers, request), fields(user_id = %user.id))]
async fn place_stripe(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    headers: HeaderMap,
    ApiJson(request): ApiJson<OrderRequest>,
) -> Result<Json<Success<CheckoutResponse>>, AppError> {
    let gateway = state.checkout()?;
    let origin = redirect_origin(&headers, &state.config().frontend_url);

    let (_, session_url) = order_service(&state)
        .place_stripe(user.id, request, &origin, gateway)
        .await?;
    Ok(ok(CheckoutResponse { session_url }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrderResponse {
    pub order_id: OrderId,
    pub order: GatewayOrder,
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
async fn place_razorpay(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<OrderRequest>,
) -> Result<Json<Success<GatewayOrderResponse>>, AppError> {
    let gateway = state.order_gateway()?;
    let (order, gateway_order) = order_service(&state)
        .place_razorpay(user.id, request, gateway)
        .await?;
    Ok(ok(GatewayOrderResponse {
        order_id: order.id,
        order: gateway_order,
    }))
}

/// Accept `true`/`false` as booleans or strings.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::String(s) => match s.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!("expected true or false, got '{other}'"))),
        },
        other => Err(D::Error::custom(format!("expected true or false, got {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStripeRequest {
    pub order_id: OrderId,
    #[serde(deserialize_with = "flag")]
    pub success: bool,
}

/// Verification outcome; `success` mirrors whether the payment went through.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    success: bool,
    message: &'static str,
}

impl VerifyResponse {
    const fn from_outcome(paid: bool) -> Self {
        Self {
            success: paid,
            message: if paid { "Payment successful" } else { "Payment failed" },
        }
    }
}

#[instrument(skip(state, user, request), fields(user_id = %user.id, order_id = %request.order_id))]
async fn verify_stripe(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<VerifyStripeRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let paid = order_service(&state)
        .verify_stripe(user.id, request.order_id, request.success)
        .await?;
    Ok(Json(VerifyResponse::from_outcome(paid)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRazorpayRequest {
    #[serde(alias = "razorpayOrderId")]
    pub razorpay_order_id: String,
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
async fn verify_razorpay(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<VerifyRazorpayRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let gateway = state.order_gateway()?;
    let paid = order_service(&state)
        .verify_razorpay(user.id, &request.razorpay_order_id, gateway)
        .await?;
    Ok(Json(VerifyResponse::from_outcome(paid)))
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct SellerOrdersResponse {
    pub orders: Vec<SellerOrder>,
}

async fn buyer_orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Success<OrdersResponse>>, AppError> {
    let orders = order_service(&state).buyer_orders(user.id).await?;
    Ok(ok(OrdersResponse { orders }))
}

async fn seller_orders(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
) -> Result<Json<Success<SellerOrdersResponse>>, AppError> {
    let orders = order_service(&state).seller_orders(seller.id).await?;
    Ok(ok(SellerOrdersResponse { orders }))
}

async fn all_orders(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Success<OrdersResponse>>, AppError> {
    let orders = order_service(&state).all_orders().await?;
    Ok(ok(OrdersResponse { orders }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub order_id: OrderId,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub message: Message,
    pub order: Order,
}

#[instrument(skip(state, _admin))]
async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiJson(request): ApiJson<StatusRequest>,
) -> Result<Json<Success<StatusResponse>>, AppError> {
    let order = order_service(&state)
        .update_status(request.order_id, &request.status)
        .await?;
    Ok(ok(StatusResponse {
        message: Message::new("Status updated"),
        order,
    }))
}

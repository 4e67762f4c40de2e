//! Cart route handlers.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use merkato_core::{Cart, ProductId};

use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::routes::{ApiJson, Success, ok};
use crate::services::{CartService, CartSummary};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(add))
        .route("/update", post(update))
        .route("/get", get(show))
}

fn cart_service(state: &AppState) -> CartService<'_> {
    CartService::new(state.repos().users.as_ref(), state.repos().products.as_ref())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub item_id: ProductId,
    pub size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub item_id: ProductId,
    pub size: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub message: &'static str,
    pub cart_data: Cart,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartWithSummary {
    pub cart_data: Cart,
    pub summary: CartSummary,
}

fn size_required(size: &str) -> Result<(), AppError> {
    if size.trim().is_empty() {
        return Err(AppError::Validation("size is required".to_string()));
    }
    Ok(())
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn add(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<AddRequest>,
) -> Result<Json<Success<CartResponse>>, AppError> {
    size_required(&request.size)?;
    let cart_data = cart_service(&state)
        .add(user.id, request.item_id, request.size)
        .await?;
    Ok(ok(CartResponse {
        message: "Added to cart",
        cart_data,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<UpdateRequest>,
) -> Result<Json<Success<CartResponse>>, AppError> {
    let cart_data = cart_service(&state)
        .set_quantity(user.id, request.item_id, request.size, request.quantity)
        .await?;
    Ok(ok(CartResponse {
        message: "Cart updated",
        cart_data,
    }))
}

async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Success<CartWithSummary>>, AppError> {
    let (cart_data, summary) = cart_service(&state).get(user.id).await?;
    Ok(ok(CartWithSummary { cart_data, summary }))
}

//! Review route handlers.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::models::{Product, ReviewableItem};
use crate::routes::{ApiJson, Success, ok};
use crate::services::ReviewService;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/list", get(list))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub token: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: &'static str,
    pub product: Product,
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
async fn submit(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<SubmitRequest>,
) -> Result<Json<Success<SubmitResponse>>, AppError> {
    let product = ReviewService::new(state.repos().reviews.as_ref())
        .submit(&user, &request.token, request.rating, &request.comment)
        .await?;
    Ok(ok(SubmitResponse {
        message: "Review submitted",
        product,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReviewableResponse {
    pub items: Vec<ReviewableItem>,
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Success<ReviewableResponse>>, AppError> {
    let items = ReviewService::new(state.repos().reviews.as_ref())
        .list_reviewable(user.id)
        .await?;
    Ok(ok(ReviewableResponse { items }))
}

//! Account route handlers: registration, login and user administration.

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use merkato_core::UserId;

use crate::error::AppError;
use crate::middleware::rate_limit::RateLimiterLayer;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::{CurrentUser, PayoutDetailsUpdate, User};
use crate::routes::{ApiJson, ApiPath, Message, Success, ok};
use crate::services::{AccountService, AuthService, Registration};
use crate::state::AppState;

pub fn routes(credentials_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/admin", post(admin_login));
    let credentials = match credentials_limiter {
        Some(limiter) => credentials.layer(limiter),
        None => credentials,
    };

    Router::new()
        .merge(credentials)
        .route("/verify-email/{token}", get(verify_email))
        .route("/profile", get(profile).put(update_profile))
        .route("/all", get(list_users))
        .route("/{user_id}", delete(delete_user))
        .route("/{user_id}/seller", put(set_seller))
}

fn auth_service(state: &AppState) -> AuthService<'_> {
    AuthService::new(
        state.repos().users.as_ref(),
        state.mailer(),
        state.tokens(),
        &state.config().admin,
        &state.config().frontend_url,
    )
}

fn account_service(state: &AppState) -> AccountService<'_> {
    AccountService::new(state.repos().users.as_ref(), state.repos().products.as_ref())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub telebirr_phone: Option<String>,
}

/// Register and mail a verification link. No session is issued.
#[instrument(skip(state, request), fields(email = %request.email))]
async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<Json<Success<Message>>, AppError> {
    auth_service(&state)
        .register(Registration {
            name: request.name,
            email: request.email,
            password: request.password,
            telebirr_phone: request.telebirr_phone,
        })
        .await?;

    Ok(ok(Message::new(
        "Registration successful. Please check your email to verify your account.",
    )))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: CurrentUser,
}

#[instrument(skip(state, request), fields(email = %request.email))]
async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<Success<LoginResponse>>, AppError> {
    let (user, token) = auth_service(&state)
        .login(&request.email, &request.password)
        .await?;

    Ok(ok(LoginResponse {
        token,
        user: CurrentUser::from(&user),
    }))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[instrument(skip(state, request))]
async fn admin_login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<Success<TokenResponse>>, AppError> {
    let token = auth_service(&state).admin_login(&request.email, &request.password)?;
    Ok(ok(TokenResponse { token }))
}

#[instrument(skip_all)]
async fn verify_email(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<Success<Message>>, AppError> {
    auth_service(&state).verify_email(&token).await?;
    Ok(ok(Message::new("Email verified. You can now log in.")))
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

async fn profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Success<UserResponse>>, AppError> {
    let user = account_service(&state).profile(user.id).await?;
    Ok(ok(UserResponse { user }))
}

#[instrument(skip(state, user, update), fields(user_id = %user.id))]
async fn update_profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(update): ApiJson<PayoutDetailsUpdate>,
) -> Result<Json<Success<UserResponse>>, AppError> {
    let user = account_service(&state)
        .update_profile(user.id, &update)
        .await?;
    Ok(ok(UserResponse { user }))
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Success<UsersResponse>>, AppError> {
    let users = account_service(&state).list_users().await?;
    Ok(ok(UsersResponse { users }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserResponse {
    pub message: String,
    pub products_removed: u64,
}

#[instrument(skip(state, _admin))]
async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Success<DeleteUserResponse>>, AppError> {
    let products_removed = account_service(&state).delete_user(user_id).await?;
    Ok(ok(DeleteUserResponse {
        message: "User and their products deleted".to_string(),
        products_removed,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSellerRequest {
    pub is_seller: bool,
}

#[instrument(skip(state, _admin, request))]
async fn set_seller(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(request): ApiJson<SetSellerRequest>,
) -> Result<Json<Success<UserResponse>>, AppError> {
    let user = account_service(&state)
        .set_seller(user_id, request.is_seller)
        .await?;
    Ok(ok(UserResponse { user }))
}

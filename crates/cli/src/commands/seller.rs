//! Seller flag management.
//!
//! The HTTP API exposes the same toggle to the operator at
//! `PUT /api/user/{userId}/seller`; this command is for bootstrapping the
//! first sellers before anyone has logged in as the operator.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string

use thiserror::Error;

use merkato_api::db::{PgStore, RepositoryError, UserStore, create_pool};
use merkato_core::{Email, EmailError};

/// Errors that can occur while changing the seller flag.
#[derive(Debug, Error)]
pub enum SellerError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No account uses the email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    /// Store error.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Set or clear the seller flag on the account with `email`.
///
/// # Errors
///
/// Returns `SellerError` if the email is invalid, no account uses it, or the
/// database fails.
pub async fn set_seller(email: &str, is_seller: bool) -> Result<(), SellerError> {
    let email = Email::parse(email)?;
    let database_url = super::database_url().map_err(SellerError::MissingEnvVar)?;

    tracing::info!("Connecting to database...");
    let store = PgStore::new(create_pool(&database_url).await?);

    let (user, _) = store
        .find_login(&email)
        .await?
        .ok_or_else(|| SellerError::UserNotFound(email.to_string()))?;

    store
        .set_seller(user.id, is_seller)
        .await?
        .ok_or_else(|| SellerError::UserNotFound(email.to_string()))?;

    tracing::info!(
        "Seller flag {} for {} (ID: {})",
        if is_seller { "granted" } else { "revoked" },
        email,
        user.id
    );
    Ok(())
}

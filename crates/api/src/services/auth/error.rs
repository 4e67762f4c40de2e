//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::email::MailError;
use crate::services::tokens::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] merkato_core::EmailError),

    /// Name missing on registration.
    #[error("name is required")]
    BlankName,

    /// Password too weak or invalid.
    #[error("{0}")]
    WeakPassword(String),

    /// User already exists.
    #[error("user with this email already exists")]
    UserAlreadyExists,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but its email is not verified yet.
    #[error("please verify your email before logging in")]
    NotVerified,

    /// No account holds this verification token.
    #[error("invalid or already used verification link")]
    VerificationTokenNotFound,

    /// Session token rejected.
    #[error("not authorized, login again: {0}")]
    Token(#[from] TokenError),

    /// The token's user has been deleted.
    #[error("not authorized, login again")]
    UserGone,

    /// Verification mail could not be sent.
    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

//! Unified error handling for the API.
//!
//! Every failure leaves the server as `{"success": false, "message": ...}`.
//! Server-side failures are captured to Sentry and answered with a generic
//! message.

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use merkato_core::AmountOutOfRange;
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::email::MailError;
use crate::services::images::UploadError;
use crate::services::payments::PaymentError;
use crate::services::tokens::TokenError;

/// Application-level error type for handlers and services.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from client.
    #[error("{0}")]
    Validation(String),

    /// Missing credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Rejected credentials or session token.
    #[error(transparent)]
    Auth(AuthError),

    /// Authenticated but lacking permission.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// State does not allow the change.
    #[error("{0}")]
    Conflict(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Sending mail failed.
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    /// Payment gateway failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Image upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// A collaborator is unavailable or not configured.
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error is the server's fault.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Mail(_)
                | Self::Payment(_)
                | Self::Upload(_)
                | Self::Dependency(_)
                | Self::Internal(_)
        )
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::Mail(_)
            | Self::Payment(_)
            | Self::Upload(_)
            | Self::Dependency(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("Not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Cart(e) => Self::NotFound(e.to_string()),
            other => Self::Database(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail(_)
            | AuthError::WeakPassword(_)
            | AuthError::BlankName
            | AuthError::UserAlreadyExists => Self::Validation(err.to_string()),
            AuthError::VerificationTokenNotFound => Self::NotFound(err.to_string()),
            AuthError::Repository(e) => e.into(),
            AuthError::Mail(e) => Self::Dependency(format!("verification mail not sent: {e}")),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
            AuthError::Token(ref e) if e.is_signing_failure() => Self::Internal(err.to_string()),
            AuthError::InvalidCredentials
            | AuthError::NotVerified
            | AuthError::Token(_)
            | AuthError::UserGone => Self::Auth(err),
        }
    }
}

impl From<AmountOutOfRange> for AppError {
    fn from(err: AmountOutOfRange) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AuthError::Token(err).into()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Validation(err.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "API request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Payment(_) => "Payment service error".to_string(),
            Self::Upload(_) => "Image upload failed".to_string(),
            Self::Mail(_) | Self::Dependency(_) => "External service error".to_string(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// Set the Sentry user context from a user ID.
pub fn set_sentry_user(user_id: i32, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

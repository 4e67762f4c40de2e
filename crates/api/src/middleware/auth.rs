//! Authentication extractors.
//!
//! Identity is re-derived from the session token on every request; nothing
//! is kept server-side. The token is read from `Authorization: Bearer ...`
//! or, for older clients, a bare `token` header.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn handler(RequireSeller(seller): RequireSeller) -> impl IntoResponse {
//!     format!("Hello, {}!", seller.name)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentAdmin, CurrentUser};
use crate::services::AuthError;
use crate::services::tokens::TokenScope;
use crate::state::AppState;

/// Legacy header some clients send the token in.
pub const TOKEN_HEADER: &str = "token";

/// Extract the raw session token from the request headers.
fn session_token(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    bearer
        .or_else(|| {
            parts
                .headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn missing_token() -> AppError {
    AppError::Unauthorized("not authorized, login again".to_string())
}

/// Extractor that requires a logged-in buyer or seller.
pub struct RequireUser(pub CurrentUser);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or_else(missing_token)?;
        let claims = state.tokens().verify(token)?;

        let TokenScope::User { id } = claims.scope else {
            return Err(missing_token());
        };

        let user = state
            .repos()
            .users
            .get_user(id)
            .await?
            .ok_or(AuthError::UserGone)?;

        set_sentry_user(user.id.as_i32(), Some(user.email.as_str()));
        Ok(Self(CurrentUser::from(&user)))
    }
}

/// Extractor that requires a logged-in seller.
pub struct RequireSeller(pub CurrentUser);

impl FromRequestParts<AppState> for RequireSeller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;

        if !user.is_seller {
            return Err(AppError::Forbidden(
                "only sellers can access this resource".to_string(),
            ));
        }

        Ok(Self(user))
    }
}

/// Extractor that requires the operator.
///
/// A valid buyer token is rejected with 403; a missing or invalid one with
/// 401. The token's email must still match the configured operator, so
/// changing `ADMIN_EMAIL` revokes old admin tokens.
pub struct RequireAdmin(pub CurrentAdmin);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or_else(missing_token)?;
        let claims = state.tokens().verify(token)?;

        match claims.scope {
            TokenScope::Admin { email }
                if email.eq_ignore_ascii_case(&state.config().admin.email) =>
            {
                Ok(Self(CurrentAdmin { email }))
            }
            TokenScope::Admin { .. } => Err(missing_token()),
            TokenScope::User { .. } => Err(AppError::Forbidden(
                "only the administrator can access this resource".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/cart/get");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).expect("valid request").into_parts().0
    }

    #[test]
    fn test_session_token_sources() {
        assert_eq!(
            session_token(&parts(&[("authorization", "Bearer abc.def")])),
            Some("abc.def")
        );
        assert_eq!(session_token(&parts(&[("token", "abc.def")])), Some("abc.def"));
        assert_eq!(
            session_token(&parts(&[
                ("authorization", "Bearer first"),
                ("token", "second")
            ])),
            Some("first")
        );
        assert_eq!(session_token(&parts(&[("token", "  ")])), None);
        assert_eq!(session_token(&parts(&[("authorization", "Basic xyz")])), None);
        assert_eq!(session_token(&parts(&[])), None);
    }
}

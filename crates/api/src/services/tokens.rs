//! Signed bearer tokens and random one-shot tokens.
//!
//! A session token is `base64url(claims) "." base64url(HMAC-SHA256(claims))`
//! keyed by `SESSION_SECRET`. Nothing is stored server-side: every request
//! re-verifies the signature and re-derives the identity from the claims.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use merkato_core::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of randomness in an email verification token.
pub const VERIFICATION_TOKEN_BYTES: usize = 32;

/// Bytes of randomness in a review token.
pub const REVIEW_TOKEN_BYTES: usize = 16;

/// Hex-encoded random token of `bytes` bytes.
#[must_use]
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Errors from issuing or verifying a session token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    /// The server could not produce a token. Not the client's fault.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Whether issuing failed, as opposed to a client presenting a bad token.
    #[must_use]
    pub const fn is_signing_failure(&self) -> bool {
        matches!(self, Self::Signing(_))
    }
}

/// Who a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenScope {
    User { id: UserId },
    Admin { email: String },
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub scope: TokenScope,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch. Absent tokens never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Issues and verifies session tokens.
pub struct SessionTokens {
    secret: SecretString,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionTokens {
    #[must_use]
    pub const fn new(secret: SecretString, ttl: Option<Duration>) -> Self {
        Self { secret, ttl }
    }

    /// Token bound to a user id.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be signed.
    pub fn issue_user(&self, id: UserId) -> Result<String, TokenError> {
        self.issue(TokenScope::User { id })
    }

    /// Token bound to the operator account.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be signed.
    pub fn issue_admin(&self, email: &str) -> Result<String, TokenError> {
        self.issue(TokenScope::Admin {
            email: email.to_owned(),
        })
    }

    fn issue(&self, scope: TokenScope) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let exp = self
            .ttl
            .and_then(|ttl| i64::try_from(ttl.as_secs()).ok())
            .map(|secs| iat.saturating_add(secs));
        let claims = Claims { scope, iat, exp };

        let payload =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Signing(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes())?);
        Ok(format!("{payload}.{signature}"))
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] for a token that is not two base64url parts,
    /// lacks a valid signature or has expired.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        self.mac()?
            .chain_update(payload.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

        if claims.exp.is_some_and(|exp| Utc::now().timestamp() >= exp) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, TokenError> {
        Ok(self
            .mac()?
            .chain_update(payload)
            .finalize()
            .into_bytes()
            .to_vec())
    }
}

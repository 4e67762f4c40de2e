//! Authenticated identities handed to handlers by the guards.

use serde::Serialize;

use merkato_core::{Email, UserId};

use super::User;

/// The buyer or seller making the request.
///
/// Re-derived from the session token and the user record on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub is_seller: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_seller: user.is_seller,
        }
    }
}

/// The operator, authenticated against the configured credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentAdmin {
    pub email: String,
}

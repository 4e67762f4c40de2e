//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merkato_core::{Cart, Email, UserId};

/// A marketplace account, buyer or seller.
///
/// Never carries the password hash or verification token; those stay in the
/// store and are only read by the credential paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub is_seller: bool,
    /// Empty when unset.
    pub telebirr_phone: String,
    /// Empty when unset.
    pub cbe_account: String,
    pub is_verified: bool,
    #[serde(rename = "cartData")]
    pub cart: Cart,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create an unverified account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub telebirr_phone: String,
    pub verification_token: String,
}

/// Payout fields a user may change on their profile.
///
/// `None` leaves the stored value as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDetailsUpdate {
    pub telebirr_phone: Option<String>,
    pub cbe_account: Option<String>,
}

impl PayoutDetailsUpdate {
    /// Apply the present fields to `user`.
    pub fn apply(&self, user: &mut User) {
        if let Some(phone) = &self.telebirr_phone {
            user.telebirr_phone.clone_from(phone);
        }
        if let Some(account) = &self.cbe_account {
            user.cbe_account.clone_from(account);
        }
    }
}

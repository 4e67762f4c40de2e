//! Account management for buyers and the operator.

use tracing::{info, instrument, warn};

use merkato_core::UserId;

use crate::db::{ProductStore, UserStore};
use crate::error::AppError;
use crate::models::{PayoutDetailsUpdate, User};

pub struct AccountService<'a> {
    users: &'a dyn UserStore,
    products: &'a dyn ProductStore,
}

impl<'a> AccountService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn UserStore, products: &'a dyn ProductStore) -> Self {
        Self { users, products }
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user no longer exists.
    pub async fn profile(&self, id: UserId) -> Result<User, AppError> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    /// Update the payout fields that are present in `update`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user no longer exists.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &PayoutDetailsUpdate,
    ) -> Result<User, AppError> {
        self.users
            .update_payout_details(id, update)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.list_users().await?)
    }

    /// Delete a user and then every product they own.
    ///
    /// The two deletes are separate writes. A reader between them can still
    /// see the products of a user that is already gone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<u64, AppError> {
        if !self.users.delete_user(id).await? {
            return Err(user_not_found(id));
        }

        let removed = self
            .products
            .delete_products_by_seller(id)
            .await
            .inspect_err(|e| warn!(user_id = %id, error = %e, "User deleted but products remain"))?;

        info!(user_id = %id, products = removed, "User deleted");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn set_seller(&self, id: UserId, is_seller: bool) -> Result<User, AppError> {
        let user = self
            .users
            .set_seller(id, is_seller)
            .await?
            .ok_or_else(|| user_not_found(id))?;
        info!(user_id = %id, is_seller, "Seller flag updated");
        Ok(user)
    }
}

fn user_not_found(id: UserId) -> AppError {
    AppError::NotFound(format!("user {id} not found"))
}

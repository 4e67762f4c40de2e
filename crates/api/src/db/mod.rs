//! Record storage for the API.
//!
//! # Stores
//!
//! Each aggregate has a store trait so services never touch SQL directly:
//!
//! - [`UserStore`] - accounts, verification tokens, payout details and carts
//! - [`ProductStore`] - listings (reviews are embedded on read)
//! - [`OrderStore`] - orders and their snapshot lines
//! - [`ReviewStore`] - review-token redemption and reviewable lines
//!
//! Two backends implement all four: [`PgStore`] over `PostgreSQL` and
//! [`MemoryStore`] for tests and demo runs. Operations that read and then
//! write (cart changes, token consumption, status changes) are single store
//! calls so each backend can make them atomic.
//!
//! # Database: `merkato`
//!
//! ## Tables
//!
//! - `merkato.user` - Accounts with JSONB cart
//! - `merkato.product` - Listings with derived rating columns
//! - `merkato.product_review` - Reviews, unique per (product, user)
//! - `merkato.order` - Orders
//! - `merkato.order_item` - Snapshot lines with review tokens
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p merkato-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use merkato_core::{Cart, CartError, Email, OrderId, OrderStatus, ProductId, UserId};

use crate::models::{
    NewOrder, NewProduct, NewReview, NewUser, Order, PayoutDetailsUpdate, Product, ProductPatch,
    ReviewableItem, User,
};

pub use memory::MemoryStore;

#[cfg(test)]
use mockall::automock;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A cart change was rejected by the cart rules.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Converts unique violations into [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(message: &'static str) -> impl Fn(sqlx::Error) -> RepositoryError {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict(message.to_owned());
        }
        RepositoryError::Database(e)
    }
}

/// A single atomic change to a user's cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// Increment one slot.
    Add { product: ProductId, size: String },
    /// Overwrite one existing slot; zero removes it.
    SetQuantity {
        product: ProductId,
        size: String,
        quantity: u32,
    },
    /// Empty the cart.
    Clear,
}

impl CartChange {
    /// Apply the change to `cart`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::SlotNotFound`] when setting a slot that was never added.
    pub fn apply(&self, cart: &mut Cart) -> Result<(), CartError> {
        match self {
            Self::Add { product, size } => {
                cart.add(*product, size);
                Ok(())
            }
            Self::SetQuantity {
                product,
                size,
                quantity,
            } => cart.set_quantity(*product, size, *quantity),
            Self::Clear => {
                cart.clear();
                Ok(())
            }
        }
    }
}

/// Account storage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create an unverified user.
    ///
    /// Fails with [`RepositoryError::Conflict`] if the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// The user and their password hash, for login.
    async fn find_login(&self, email: &Email) -> Result<Option<(User, String)>, RepositoryError>;

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    /// Returns whether a user was deleted. Owned products are not touched.
    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError>;

    /// Mark the holder of `token` verified and clear the token in one step.
    async fn verify_email(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    async fn update_payout_details(
        &self,
        id: UserId,
        update: &PayoutDetailsUpdate,
    ) -> Result<Option<User>, RepositoryError>;

    async fn set_seller(&self, id: UserId, is_seller: bool)
    -> Result<Option<User>, RepositoryError>;

    /// Apply `change` to the stored cart atomically and return the result.
    ///
    /// Fails with [`RepositoryError::NotFound`] if the user is gone.
    async fn update_cart(&self, id: UserId, change: CartChange) -> Result<Cart, RepositoryError>;
}

/// Listing storage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Products among `ids` that exist, in id order.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn list_products_by_seller(&self, seller: UserId)
    -> Result<Vec<Product>, RepositoryError>;

    /// Apply `patch` (including the on-sale rule) and return the new state.
    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, RepositoryError>;

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Returns the number of products deleted.
    async fn delete_products_by_seller(&self, seller: UserId) -> Result<u64, RepositoryError>;
}

/// Order storage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError>;

    async fn list_orders_by_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Orders with at least one line for any of `products`.
    async fn list_orders_with_products(
        &self,
        products: &[ProductId],
    ) -> Result<Vec<Order>, RepositoryError>;

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError>;

    /// Set `payment` on an order owned by `user`. Returns whether it matched.
    async fn mark_paid(&self, id: OrderId, user: UserId) -> Result<bool, RepositoryError>;

    /// Delete an unpaid order owned by `user`. Returns whether it matched.
    async fn delete_unpaid_order(&self, id: OrderId, user: UserId)
    -> Result<bool, RepositoryError>;

    /// Move an order from `from` to `to` if it is still in `from`.
    ///
    /// Entering `Delivered` stamps a fresh review token on every line that
    /// lacks one, in the same write. Returns `None` if the order is gone or
    /// its status changed in the meantime.
    async fn advance_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// Review redemption.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Lines of the user's delivered orders that still hold a review token.
    async fn list_reviewable(&self, user: UserId) -> Result<Vec<ReviewableItem>, RepositoryError>;

    /// Redeem a review token.
    ///
    /// Appends the review, recomputes the product's rating from all its
    /// reviews and clears the token as one unit. Fails with
    /// [`RepositoryError::NotFound`] if no line of the user's orders holds
    /// the token and [`RepositoryError::Conflict`] if the user already
    /// reviewed the product.
    async fn redeem_review_token(&self, review: NewReview) -> Result<Product, RepositoryError>;
}

/// The stores the services run against.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pool: Option<PgPool>,
}

impl Repositories {
    /// All stores backed by one `PostgreSQL` pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            users: store.clone(),
            products: store.clone(),
            orders: store.clone(),
            reviews: store,
            pool: Some(pool),
        }
    }

    /// All stores backed by one shared in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            products: store.clone(),
            orders: store.clone(),
            reviews: store,
            pool: None,
        }
    }

    /// Check that the backing store answers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if `PostgreSQL` is unreachable.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// `PostgreSQL` implementation of every store trait.
///
/// The trait impls are split by aggregate across the sibling modules.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

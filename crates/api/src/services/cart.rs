//! Cart service.
//!
//! The cart is a sparse `product -> size -> quantity` map stored on the
//! user. Every change is one atomic store call; contents are never checked
//! against live stock.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use merkato_core::{AmountOutOfRange, Cart, ProductId, UserId, checked_sum, line_total};

use crate::db::{CartChange, ProductStore, UserStore};
use crate::error::AppError;

/// Totals shown next to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    /// Units across all slots, including ones whose product is gone.
    pub item_count: u32,
    /// Priced at the current product price; missing products are skipped.
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

pub struct CartService<'a> {
    users: &'a dyn UserStore,
    products: &'a dyn ProductStore,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn UserStore, products: &'a dyn ProductStore) -> Self {
        Self { users, products }
    }

    /// Increment one slot by one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user no longer exists.
    pub async fn add(&self, user: UserId, product: ProductId, size: String) -> Result<Cart, AppError> {
        Ok(self
            .users
            .update_cart(user, CartChange::Add { product, size })
            .await?)
    }

    /// Overwrite one slot; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the slot was never added.
    pub async fn set_quantity(
        &self,
        user: UserId,
        product: ProductId,
        size: String,
        quantity: u32,
    ) -> Result<Cart, AppError> {
        Ok(self
            .users
            .update_cart(
                user,
                CartChange::SetQuantity {
                    product,
                    size,
                    quantity,
                },
            )
            .await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user no longer exists.
    pub async fn clear(&self, user: UserId) -> Result<(), AppError> {
        self.users.update_cart(user, CartChange::Clear).await?;
        Ok(())
    }

    /// The stored cart and its summary.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user no longer exists, or
    /// `AppError::Validation` if the subtotal overflows.
    pub async fn get(&self, user: UserId) -> Result<(Cart, CartSummary), AppError> {
        let cart = self
            .users
            .get_user(user)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?
            .cart;

        let ids: Vec<ProductId> = cart.product_ids().collect();
        let prices: BTreeMap<ProductId, Decimal> = self
            .products
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.price))
            .collect();

        let subtotal = cart
            .lines()
            .filter_map(|(product, _, quantity)| {
                prices.get(&product).map(|price| line_total(*price, quantity))
            })
            .collect::<Option<Vec<_>>>()
            .and_then(checked_sum)
            .ok_or(AmountOutOfRange)?;

        let summary = CartSummary {
            item_count: cart.total_quantity(),
            subtotal,
        };
        Ok((cart, summary))
    }
}

//! Sparse shopping cart.
//!
//! A cart maps `product id -> size -> quantity`. Both levels are
//! [`BTreeMap`]s, so iteration is ordered by product id and then by size
//! label. Zero quantities are never stored and a product whose size map
//! becomes empty is dropped entirely, so an empty cart is always `{}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ProductId;

/// Errors from cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The (product, size) slot has never been added.
    #[error("product {product} in size '{size}' is not in the cart")]
    SlotNotFound {
        /// Product of the missing slot.
        product: ProductId,
        /// Size label of the missing slot.
        size: String,
    },
}

/// A user's cart.
///
/// ```
/// use merkato_core::{Cart, ProductId};
///
/// let mut cart = Cart::default();
/// cart.add(ProductId::new(7), "M");
/// cart.add(ProductId::new(7), "M");
/// assert_eq!(cart.quantity(ProductId::new(7), "M"), 2);
///
/// cart.set_quantity(ProductId::new(7), "M", 0).unwrap();
/// assert!(cart.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart(BTreeMap<ProductId, BTreeMap<String, u32>>);

impl Cart {
    /// Increment the quantity of a slot by one, creating it if needed.
    ///
    /// Returns the new quantity.
    pub fn add(&mut self, product: ProductId, size: &str) -> u32 {
        let quantity = self
            .0
            .entry(product)
            .or_default()
            .entry(size.to_owned())
            .or_insert(0);
        *quantity = quantity.saturating_add(1);
        *quantity
    }

    /// Overwrite the quantity of an existing slot. Zero removes the slot.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::SlotNotFound`] if the slot was never added.
    pub fn set_quantity(
        &mut self,
        product: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<(), CartError> {
        let missing = || CartError::SlotNotFound {
            product,
            size: size.to_owned(),
        };
        let sizes = self.0.get_mut(&product).ok_or_else(missing)?;
        let slot = sizes.get_mut(size).ok_or_else(missing)?;

        if quantity > 0 {
            *slot = quantity;
            return Ok(());
        }

        sizes.remove(size);
        if sizes.is_empty() {
            self.0.remove(&product);
        }
        Ok(())
    }

    /// Quantity held for a slot, zero if absent.
    #[must_use]
    pub fn quantity(&self, product: ProductId, size: &str) -> u32 {
        self.0
            .get(&product)
            .and_then(|sizes| sizes.get(size))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate `(product, size, quantity)` in product then size order.
    pub fn lines(&self) -> impl Iterator<Item = (ProductId, &str, u32)> + '_ {
        self.0.iter().flat_map(|(product, sizes)| {
            sizes
                .iter()
                .map(move |(size, quantity)| (*product, size.as_str(), *quantity))
        })
    }

    /// Distinct products referenced by the cart.
    pub fn product_ids(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.0.keys().copied()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines()
            .fold(0_u32, |acc, (_, _, quantity)| acc.saturating_add(quantity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const P1: ProductId = ProductId::new(1);
    const P2: ProductId = ProductId::new(2);

    #[test]
    fn test_add_creates_and_increments() {
        let mut cart = Cart::default();
        assert_eq!(cart.add(P1, "M"), 1);
        assert_eq!(cart.add(P1, "M"), 2);
        assert_eq!(cart.add(P1, "L"), 1);
        assert_eq!(cart.quantity(P1, "M"), 2);
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::default();
        cart.add(P1, "M");
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(serde_json::to_string(&cart).unwrap(), "{}");
    }

    #[test]
    fn test_set_quantity_overwrites() {
        let mut cart = Cart::default();
        cart.add(P1, "M");
        cart.set_quantity(P1, "M", 5).unwrap();
        assert_eq!(cart.quantity(P1, "M"), 5);
    }

    #[test]
    fn test_set_quantity_zero_prunes_levels() {
        let mut cart = Cart::default();
        cart.add(P1, "M");
        cart.add(P2, "S");
        cart.set_quantity(P1, "M", 0).unwrap();

        assert_eq!(cart.product_ids().collect::<Vec<_>>(), vec![P2]);
        assert_eq!(serde_json::to_string(&cart).unwrap(), r#"{"2":{"S":1}}"#);
    }

    #[test]
    fn test_set_quantity_on_missing_slot_fails() {
        let mut cart = Cart::default();
        cart.add(P1, "M");

        assert!(matches!(
            cart.set_quantity(P1, "XL", 3),
            Err(CartError::SlotNotFound { .. })
        ));
        assert!(cart.set_quantity(P2, "M", 0).is_err());
        assert_eq!(cart.quantity(P1, "M"), 1);
    }

    #[test]
    fn test_lines_are_ordered() {
        let mut cart = Cart::default();
        cart.add(P2, "S");
        cart.add(P1, "XL");
        cart.add(P1, "L");

        let lines: Vec<_> = cart.lines().collect();
        assert_eq!(lines, vec![(P1, "L", 1), (P1, "XL", 1), (P2, "S", 1)]);
    }

    #[test]
    fn test_json_roundtrip_matches_stored_shape() {
        let cart: Cart = serde_json::from_str(r#"{"4":{"M":2,"L":1}}"#).unwrap();
        assert_eq!(cart.quantity(ProductId::new(4), "M"), 2);
        assert_eq!(
            serde_json::to_string(&cart).unwrap(),
            r#"{"4":{"L":1,"M":2}}"#
        );
    }
}

//! Order domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merkato_core::{
    AmountOutOfRange, OrderId, OrderStatus, PaymentMethod, ProductId, UserId, checked_sum,
    line_total,
};

/// Delivery address as entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,
    pub phone: String,
}

/// One line of an order, copied from the product at placement.
///
/// Name, price and images never follow later product edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    pub image: Vec<String>,
    pub size: Option<String>,
    /// Present once the order is delivered and until the item is reviewed.
    pub review_token: Option<String>,
}

impl OrderItem {
    /// Price times quantity, `None` on overflow.
    #[must_use]
    pub fn total(&self) -> Option<Decimal> {
        line_total(self.price, self.quantity)
    }
}

/// A buyer's order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    /// Total as submitted by the client at checkout.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub address: Address,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
}

/// Data for a new, unpaid order in status `Order Placed`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub amount: Decimal,
    pub address: Address,
    pub payment_method: PaymentMethod,
}

/// An order as one seller sees it: only their lines, priced on their own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrder {
    #[serde(rename = "_id")]
    pub id: OrderId,
    pub buyer_user_id: UserId,
    pub address: Address,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    /// Sum of price times quantity over `items` only.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

impl SellerOrder {
    /// Project `order` onto the lines whose product is in `products`.
    ///
    /// Returns `Ok(None)` when the order has no such lines.
    ///
    /// # Errors
    ///
    /// Returns [`AmountOutOfRange`] if the seller's total overflows.
    pub fn project(
        order: &Order,
        products: &BTreeSet<ProductId>,
    ) -> Result<Option<Self>, AmountOutOfRange> {
        let items: Vec<OrderItem> = order
            .items
            .iter()
            .filter(|item| products.contains(&item.product_id))
            .cloned()
            .collect();

        if items.is_empty() {
            return Ok(None);
        }

        let amount = items
            .iter()
            .map(OrderItem::total)
            .collect::<Option<Vec<_>>>()
            .and_then(checked_sum)
            .ok_or(AmountOutOfRange)?;
        Ok(Some(Self {
            id: order.id,
            buyer_user_id: order.user_id,
            address: order.address.clone(),
            date: order.date,
            status: order.status,
            items,
            amount,
        }))
    }
}

/// A delivered line the buyer may still review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewableItem {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub item: OrderItem,
}

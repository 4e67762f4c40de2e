//! `PostgreSQL` order storage.
//!
//! Lines are kept in `merkato.order_item` with their position so an order
//! reads back in the order it was placed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use merkato_core::{OrderId, OrderStatus, PaymentMethod, ProductId, UserId};

use super::{OrderStore, PgStore, RepositoryError};
use crate::models::{Address, NewOrder, Order, OrderItem};
use crate::services::tokens::{REVIEW_TOKEN_BYTES, random_token};

const ORDER_COLUMNS: &str =
    "id, user_id, amount, address, status, payment_method, payment, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    amount: Decimal,
    address: Json<Address>,
    status: OrderStatus,
    payment_method: PaymentMethod,
    payment: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderItemRow {
    pub(super) order_id: i32,
    product_id: i32,
    name: String,
    price: Decimal,
    quantity: i32,
    images: Vec<String>,
    size: Option<String>,
    review_token: Option<String>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "invalid quantity {} on order {}",
                row.quantity, row.order_id
            ))
        })?;

        Ok(Self {
            product_id: ProductId::new(row.product_id),
            name: row.name,
            price: row.price,
            quantity,
            image: row.images,
            size: row.size,
            review_token: row.review_token,
        })
    }
}

const ORDER_ITEM_COLUMNS: &str =
    "order_id, product_id, name, price, quantity, images, size, review_token";

impl PgStore {
    /// Attach lines to order rows, keeping row order.
    async fn load_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM merkato.order_item
             WHERE order_id = ANY($1)
             ORDER BY order_id, position"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: BTreeMap<i32, Vec<OrderItem>> = BTreeMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        Ok(rows
            .into_iter()
            .map(|row| Order {
                id: OrderId::new(row.id),
                user_id: UserId::new(row.user_id),
                items: items.remove(&row.id).unwrap_or_default(),
                amount: row.amount,
                address: row.address.0,
                status: row.status,
                payment_method: row.payment_method,
                payment: row.payment,
                date: row.created_at,
            })
            .collect())
    }
}

fn quantity_column(item: &OrderItem) -> Result<i32, RepositoryError> {
    i32::try_from(item.quantity)
        .map_err(|_| RepositoryError::Conflict(format!("quantity {} too large", item.quantity)))
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO merkato.order (user_id, amount, address, status, payment_method)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(new.user_id.as_i32())
        .bind(new.amount)
        .bind(Json(&new.address))
        .bind(OrderStatus::OrderPlaced)
        .bind(new.payment_method)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in (0_i32..).zip(&new.items) {
            sqlx::query(
                "INSERT INTO merkato.order_item
                     (order_id, position, product_id, name, price, quantity, images, size)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(row.id)
            .bind(position)
            .bind(item.product_id.as_i32())
            .bind(&item.name)
            .bind(item.price)
            .bind(quantity_column(item)?)
            .bind(&item.image)
            .bind(&item.size)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id: OrderId::new(row.id),
            user_id: new.user_id,
            items: new.items,
            amount: row.amount,
            address: row.address.0,
            status: row.status,
            payment_method: row.payment_method,
            payment: row.payment,
            date: row.created_at,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM merkato.order WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.load_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM merkato.order ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.load_items(rows).await
    }

    async fn list_orders_by_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM merkato.order WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user.as_i32())
        .fetch_all(&self.pool)
        .await?;

        self.load_items(rows).await
    }

    async fn list_orders_with_products(
        &self,
        products: &[ProductId],
    ) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<i32> = products.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM merkato.order
             WHERE id IN (SELECT order_id FROM merkato.order_item WHERE product_id = ANY($1))
             ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        self.load_items(rows).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM merkato.order WHERE id = $1")
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_paid(&self, id: OrderId, user: UserId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE merkato.order SET payment = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id.as_i32())
                .bind(user.as_i32())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_unpaid_order(
        &self,
        id: OrderId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM merkato.order WHERE id = $1 AND user_id = $2 AND payment = FALSE",
        )
        .bind(id.as_i32())
        .bind(user.as_i32())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn advance_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let moved: Option<(i32,)> = sqlx::query_as(
            "UPDATE merkato.order SET status = $3 WHERE id = $1 AND status = $2 RETURNING id",
        )
        .bind(id.as_i32())
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        if moved.is_none() {
            return Ok(None);
        }

        if to.is_delivered() {
            let unstamped: Vec<(i32,)> = sqlx::query_as(
                "SELECT id FROM merkato.order_item WHERE order_id = $1 AND review_token IS NULL",
            )
            .bind(id.as_i32())
            .fetch_all(&mut *tx)
            .await?;

            for (item_id,) in unstamped {
                sqlx::query("UPDATE merkato.order_item SET review_token = $2 WHERE id = $1")
                    .bind(item_id)
                    .bind(random_token(REVIEW_TOKEN_BYTES))
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.get_order(id).await
    }
}

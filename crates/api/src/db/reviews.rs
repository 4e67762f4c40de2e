//! `PostgreSQL` review redemption.

use async_trait::async_trait;

use merkato_core::{OrderId, OrderStatus, ProductId, UserId};

use super::orders::OrderItemRow;
use super::{PgStore, ProductStore, RepositoryError, ReviewStore, conflict_on_unique};
use crate::models::{NewReview, Product, ReviewableItem};

#[async_trait]
impl ReviewStore for PgStore {
    async fn list_reviewable(&self, user: UserId) -> Result<Vec<ReviewableItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT oi.order_id, oi.product_id, oi.name, oi.price, oi.quantity, oi.images,
                    oi.size, oi.review_token
             FROM merkato.order_item oi
             JOIN merkato.order o ON o.id = oi.order_id
             WHERE o.user_id = $1 AND o.status = $2 AND oi.review_token IS NOT NULL
             ORDER BY o.id, oi.position",
        )
        .bind(user.as_i32())
        .bind(OrderStatus::Delivered)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let order_id = OrderId::new(row.order_id);
                Ok(ReviewableItem {
                    order_id,
                    item: row.try_into()?,
                })
            })
            .collect()
    }

    async fn redeem_review_token(&self, review: NewReview) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Locking the line makes a second redemption of the same token wait
        // and then find it cleared.
        let (item_id, product_id): (i32, i32) = sqlx::query_as(
            "SELECT oi.id, oi.product_id
             FROM merkato.order_item oi
             JOIN merkato.order o ON o.id = oi.order_id
             WHERE oi.review_token = $1 AND o.user_id = $2
             FOR UPDATE OF oi",
        )
        .bind(&review.token)
        .bind(review.user.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query("SELECT id FROM merkato.product WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "INSERT INTO merkato.product_review (product_id, user_id, name, rating, comment)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(product_id)
        .bind(review.user.as_i32())
        .bind(&review.name)
        .bind(i16::from(review.rating.get()))
        .bind(&review.comment)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on_unique("product already reviewed by this user"))?;

        sqlx::query(
            "UPDATE merkato.product p
             SET rating = s.rating, num_reviews = s.num_reviews
             FROM (
                 SELECT COALESCE(AVG(rating), 0)::DOUBLE PRECISION AS rating,
                        COUNT(*)::INTEGER AS num_reviews
                 FROM merkato.product_review
                 WHERE product_id = $1
             ) s
             WHERE p.id = $1",
        )
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE merkato.order_item SET review_token = NULL WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_product(ProductId::new(product_id))
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}

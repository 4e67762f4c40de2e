//! `PostgreSQL` listing storage.
//!
//! Reviews live in `merkato.product_review` and are attached to each
//! product on read, oldest first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use merkato_core::{ProductId, Rating, UserId};

use super::{PgStore, ProductStore, RepositoryError};
use crate::models::{NewProduct, Product, ProductPatch, Review};

const PRODUCT_COLUMNS: &str = "id, seller_id, name, description, price, original_price, images, \
                               department, category, sub_category, main_category, color, sizes, \
                               purchase_options, bestseller, rating, num_reviews, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    seller_id: i32,
    name: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    images: Vec<String>,
    department: String,
    category: String,
    sub_category: String,
    main_category: Option<String>,
    color: Option<String>,
    sizes: Vec<String>,
    purchase_options: Vec<String>,
    bestseller: bool,
    rating: f64,
    num_reviews: i32,
    created_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, reviews: Vec<Review>) -> Result<Product, RepositoryError> {
        let num_reviews = u32::try_from(self.num_reviews).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative review count on product {}",
                self.id
            ))
        })?;

        Ok(Product {
            id: ProductId::new(self.id),
            seller_id: UserId::new(self.seller_id),
            name: self.name,
            description: self.description,
            price: self.price,
            original_price: self.original_price,
            images: self.images,
            department: self.department,
            category: self.category,
            sub_category: self.sub_category,
            main_category: self.main_category,
            color: self.color,
            sizes: self.sizes,
            purchase_options: self.purchase_options,
            bestseller: self.bestseller,
            date: self.created_at,
            rating: self.rating,
            num_reviews,
            reviews,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    product_id: i32,
    user_id: i32,
    name: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::try_from(i64::from(row.rating)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid rating in database: {e}"))
        })?;

        Ok(Self {
            user: UserId::new(row.user_id),
            name: row.name,
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

impl PgStore {
    /// Attach reviews to product rows, keeping row order.
    async fn hydrate(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let review_rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT product_id, user_id, name, rating, comment, created_at
             FROM merkato.product_review
             WHERE product_id = ANY($1)
             ORDER BY created_at, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut reviews: BTreeMap<i32, Vec<Review>> = BTreeMap::new();
        for row in review_rows {
            let product_id = row.product_id;
            reviews.entry(product_id).or_default().push(row.try_into()?);
        }

        rows.into_iter()
            .map(|row| {
                let attached = reviews.remove(&row.id).unwrap_or_default();
                row.into_product(attached)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<ProductRow>) -> Result<Option<Product>, RepositoryError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product, RepositoryError> {
        let attributes = new.attributes;
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO merkato.product
                 (seller_id, name, description, price, original_price, images, department,
                  category, sub_category, main_category, color, sizes, purchase_options, bestseller)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(new.seller_id.as_i32())
        .bind(&attributes.name)
        .bind(&attributes.description)
        .bind(attributes.price)
        .bind(attributes.original_price)
        .bind(&new.images)
        .bind(&attributes.department)
        .bind(&attributes.category)
        .bind(&attributes.sub_category)
        .bind(&attributes.main_category)
        .bind(&attributes.color)
        .bind(&attributes.sizes)
        .bind(&attributes.purchase_options)
        .bind(attributes.bestseller)
        .fetch_one(&self.pool)
        .await?;

        row.into_product(Vec::new())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM merkato.product WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM merkato.product WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM merkato.product ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_products_by_seller(
        &self,
        seller: UserId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM merkato.product WHERE seller_id = $1 ORDER BY id"
        ))
        .bind(seller.as_i32())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, RepositoryError> {
        // `price` on the right-hand side is the pre-update value.
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE merkato.product SET
                 name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 price = COALESCE($4, price),
                 original_price = CASE
                     WHEN $5::NUMERIC IS NOT NULL AND COALESCE($4, price) < $5::NUMERIC
                     THEN $5::NUMERIC
                     ELSE NULL
                 END,
                 department = COALESCE($6, department),
                 category = COALESCE($7, category),
                 sub_category = COALESCE($8, sub_category),
                 main_category = COALESCE($9, main_category),
                 color = COALESCE($10, color),
                 sizes = COALESCE($11, sizes),
                 purchase_options = COALESCE($12, purchase_options),
                 bestseller = COALESCE($13, bestseller)
             WHERE id = $1
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.price)
        .bind(patch.original_price)
        .bind(&patch.department)
        .bind(&patch.category)
        .bind(&patch.sub_category)
        .bind(&patch.main_category)
        .bind(&patch.color)
        .bind(&patch.sizes)
        .bind(&patch.purchase_options)
        .bind(patch.bestseller)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM merkato.product WHERE id = $1")
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_products_by_seller(&self, seller: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM merkato.product WHERE seller_id = $1")
            .bind(seller.as_i32())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

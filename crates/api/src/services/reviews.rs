//! Review service.
//!
//! Only a buyer holding an unredeemed token from a delivered order can
//! review; each token works once.

use tracing::{info, instrument};

use merkato_core::{Rating, UserId};

use crate::db::{RepositoryError, ReviewStore};
use crate::error::AppError;
use crate::models::{CurrentUser, NewReview, Product, ReviewableItem};

pub struct ReviewService<'a> {
    reviews: &'a dyn ReviewStore,
}

impl<'a> ReviewService<'a> {
    #[must_use]
    pub const fn new(reviews: &'a dyn ReviewStore) -> Self {
        Self { reviews }
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn list_reviewable(&self, user: UserId) -> Result<Vec<ReviewableItem>, AppError> {
        Ok(self.reviews.list_reviewable(user).await?)
    }

    /// Redeem `token` for a review and return the re-rated product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a rating outside 1..=5 or a blank
    /// comment, `AppError::NotFound` for an unknown or spent token and
    /// `AppError::Conflict` if the user already reviewed the product.
    #[instrument(skip(self, user, comment), fields(user_id = %user.id))]
    pub async fn submit(
        &self,
        user: &CurrentUser,
        token: &str,
        rating: i64,
        comment: &str,
    ) -> Result<Product, AppError> {
        let rating = Rating::try_from(rating).map_err(|e| AppError::Validation(e.to_string()))?;
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(AppError::Validation("comment is required".to_string()));
        }
        if token.trim().is_empty() {
            return Err(AppError::Validation("review token is required".to_string()));
        }

        let product = self
            .reviews
            .redeem_review_token(NewReview {
                token: token.trim().to_string(),
                user: user.id,
                name: user.name.clone(),
                rating,
                comment: comment.to_string(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => {
                    AppError::NotFound("review token is invalid or already used".to_string())
                }
                RepositoryError::Conflict(_) => {
                    AppError::Conflict("you already reviewed this product".to_string())
                }
                other => other.into(),
            })?;

        info!(product_id = %product.id, rating = product.rating, "Review submitted");
        Ok(product)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use merkato_core::{Email, OrderStatus, PaymentMethod, ProductId};

    use super::*;
    use crate::db::{MemoryStore, OrderStore, ProductStore, UserStore};
    use crate::models::{Address, NewOrder, NewProduct, NewUser, OrderItem, ProductAttributes};

    async fn buyer(store: &MemoryStore, name: &str) -> CurrentUser {
        let user = store
            .insert_user(NewUser {
                name: name.to_string(),
                email: Email::parse(&format!("{}@shop.et", name.to_lowercase())).unwrap(),
                password_hash: "hash".to_string(),
                telebirr_phone: String::new(),
                verification_token: format!("verify-{name}"),
            })
            .await
            .unwrap();
        CurrentUser::from(&user)
    }

    async fn product(store: &MemoryStore) -> ProductId {
        store
            .insert_product(NewProduct::new(
                UserId::new(50),
                ProductAttributes {
                    name: "Coffee pot".to_string(),
                    description: "Clay jebena".to_string(),
                    price: Decimal::new(40, 0),
                    original_price: None,
                    department: "Home".to_string(),
                    category: "Kitchen".to_string(),
                    sub_category: "Coffee".to_string(),
                    main_category: None,
                    color: None,
                    sizes: Vec::new(),
                    purchase_options: Vec::new(),
                    bestseller: false,
                },
                vec!["https://cdn.example/jebena.jpg".to_string()],
            ))
            .await
            .unwrap()
            .id
    }

    /// Place and deliver an order for one unit of `product`; returns the token.
    async fn delivered_token(store: &MemoryStore, user: &CurrentUser, product: ProductId) -> String {
        let order = store
            .insert_order(NewOrder {
                user_id: user.id,
                items: vec![OrderItem {
                    product_id: product,
                    name: "Coffee pot".to_string(),
                    price: Decimal::new(40, 0),
                    quantity: 1,
                    image: Vec::new(),
                    size: None,
                    review_token: None,
                }],
                amount: Decimal::new(40, 0),
                address: Address::default(),
                payment_method: PaymentMethod::Cod,
            })
            .await
            .unwrap();
        let delivered = store
            .advance_status(order.id, OrderStatus::OrderPlaced, OrderStatus::Delivered)
            .await
            .unwrap()
            .unwrap();
        delivered.items[0].review_token.clone().unwrap()
    }

    #[tokio::test]
    async fn test_ratings_average_across_buyers() {
        let store = MemoryStore::default();
        let reviews = ReviewService::new(&store);
        let p = product(&store).await;

        let mut last = None;
        for (name, rating) in [("Abebe", 5), ("Bethel", 3), ("Chala", 4)] {
            let user = buyer(&store, name).await;
            let token = delivered_token(&store, &user, p).await;
            last = Some(reviews.submit(&user, &token, rating, "Good").await.unwrap());
        }

        let product = last.unwrap();
        assert_eq!(product.num_reviews, 3);
        assert!((product.rating - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let store = MemoryStore::default();
        let reviews = ReviewService::new(&store);
        let p = product(&store).await;
        let user = buyer(&store, "Abebe").await;
        let token = delivered_token(&store, &user, p).await;

        reviews.submit(&user, &token, 5, "Great").await.unwrap();
        let err = reviews.submit(&user, &token, 4, "Again").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(reviews.list_reviewable(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_buyers_token_is_rejected() {
        let store = MemoryStore::default();
        let reviews = ReviewService::new(&store);
        let p = product(&store).await;
        let owner = buyer(&store, "Abebe").await;
        let other = buyer(&store, "Bethel").await;
        let token = delivered_token(&store, &owner, p).await;

        let err = reviews.submit(&other, &token, 5, "Mine now").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_review_of_same_product_conflicts() {
        let store = MemoryStore::default();
        let reviews = ReviewService::new(&store);
        let p = product(&store).await;
        let user = buyer(&store, "Abebe").await;
        let first = delivered_token(&store, &user, p).await;
        let second = delivered_token(&store, &user, p).await;

        reviews.submit(&user, &first, 5, "Great").await.unwrap();
        let err = reviews.submit(&user, &second, 1, "Changed my mind").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_input_validation() {
        let store = MemoryStore::default();
        let reviews = ReviewService::new(&store);
        let user = buyer(&store, "Abebe").await;

        for (rating, comment) in [(0, "ok"), (6, "ok"), (3, "   ")] {
            let err = reviews.submit(&user, "token", rating, comment).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }
}

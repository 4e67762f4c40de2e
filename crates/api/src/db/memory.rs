//! In-memory store.
//!
//! Every operation takes one lock over all tables, so read-modify-write
//! operations are atomic with respect to each other. Used by the test
//! suites and by `MERKATO_STORE=memory` demo runs; nothing survives a
//! restart.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use merkato_core::{
    Cart, Email, OrderId, OrderStatus, ProductId, RatingSummary, UserId,
};

use super::{
    CartChange, OrderStore, ProductStore, RepositoryError, ReviewStore, UserStore,
};
use crate::models::{
    NewOrder, NewProduct, NewReview, NewUser, Order, PayoutDetailsUpdate, Product, ProductPatch,
    Review, ReviewableItem, User,
};
use crate::services::tokens::{REVIEW_TOKEN_BYTES, random_token};

#[derive(Debug)]
struct UserRecord {
    user: User,
    password_hash: String,
    verification_token: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    next_user: i32,
    next_product: i32,
    next_order: i32,
}

impl Tables {
    fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(&id).map(|record| &mut record.user)
    }
}

/// Process-local store implementing every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|r| r.user.email == new.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let id = UserId::new(next_id(&mut tables.next_user));
        let user = User {
            id,
            name: new.name,
            email: new.email,
            is_seller: false,
            telebirr_phone: new.telebirr_phone,
            cbe_account: String::new(),
            is_verified: false,
            cart: Cart::default(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            id,
            UserRecord {
                user: user.clone(),
                password_hash: new.password_hash,
                verification_token: Some(new.verification_token),
            },
        );
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).map(|r| r.user.clone()))
    }

    async fn find_login(&self, email: &Email) -> Result<Option<(User, String)>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|r| &r.user.email == email)
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().map(|r| r.user.clone()).collect())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.remove(&id).is_some())
    }

    async fn verify_email(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables
            .users
            .values_mut()
            .find(|r| r.verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };

        record.verification_token = None;
        record.user.is_verified = true;
        record.user.updated_at = Utc::now();
        Ok(Some(record.user.clone()))
    }

    async fn update_payout_details(
        &self,
        id: UserId,
        update: &PayoutDetailsUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.user_mut(id).map(|user| {
            update.apply(user);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_seller(
        &self,
        id: UserId,
        is_seller: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.user_mut(id).map(|user| {
            user.is_seller = is_seller;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_cart(&self, id: UserId, change: CartChange) -> Result<Cart, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(id).ok_or(RepositoryError::NotFound)?;
        change.apply(&mut user.cart)?;
        user.updated_at = Utc::now();
        Ok(user.cart.clone())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let id = ProductId::new(next_id(&mut tables.next_product));
        let attributes = new.attributes;
        let product = Product {
            id,
            seller_id: new.seller_id,
            name: attributes.name,
            description: attributes.description,
            price: attributes.price,
            original_price: attributes.original_price,
            images: new.images,
            department: attributes.department,
            category: attributes.category,
            sub_category: attributes.sub_category,
            main_category: attributes.main_category,
            color: attributes.color,
            sizes: attributes.sizes,
            purchase_options: attributes.purchase_options,
            bestseller: attributes.bestseller,
            date: Utc::now(),
            rating: 0.0,
            num_reviews: 0,
            reviews: Vec::new(),
        };
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.lock().await;
        let wanted: BTreeSet<ProductId> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.products.values().cloned().collect())
    }

    async fn list_products_by_seller(
        &self,
        seller: UserId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .products
            .values()
            .filter(|p| p.seller_id == seller)
            .cloned()
            .collect())
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.products.get_mut(&id).map(|product| {
            patch.apply(product);
            product.clone()
        }))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.products.remove(&id).is_some())
    }

    async fn delete_products_by_seller(&self, seller: UserId) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let before = tables.products.len();
        tables.products.retain(|_, p| p.seller_id != seller);
        Ok((before - tables.products.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let id = OrderId::new(next_id(&mut tables.next_order));
        let order = Order {
            id,
            user_id: new.user_id,
            items: new.items,
            amount: new.amount,
            address: new.address,
            status: OrderStatus::OrderPlaced,
            payment_method: new.payment_method,
            payment: false,
            date: Utc::now(),
        };
        tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.values().cloned().collect())
    }

    async fn list_orders_by_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.user_id == user)
            .cloned()
            .collect())
    }

    async fn list_orders_with_products(
        &self,
        products: &[ProductId],
    ) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.items.iter().any(|i| products.contains(&i.product_id)))
            .cloned()
            .collect())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.orders.remove(&id).is_some())
    }

    async fn mark_paid(&self, id: OrderId, user: UserId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        match tables.orders.get_mut(&id) {
            Some(order) if order.user_id == user => {
                order.payment = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_unpaid_order(
        &self,
        id: OrderId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let matches = tables
            .orders
            .get(&id)
            .is_some_and(|o| o.user_id == user && !o.payment);
        if matches {
            tables.orders.remove(&id);
        }
        Ok(matches)
    }

    async fn advance_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(order) = tables.orders.get_mut(&id).filter(|o| o.status == from) else {
            return Ok(None);
        };

        order.status = to;
        if to.is_delivered() {
            for item in order.items.iter_mut().filter(|i| i.review_token.is_none()) {
                item.review_token = Some(random_token(REVIEW_TOKEN_BYTES));
            }
        }
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn list_reviewable(&self, user: UserId) -> Result<Vec<ReviewableItem>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.user_id == user && o.status.is_delivered())
            .flat_map(|o| {
                o.items
                    .iter()
                    .filter(|i| i.review_token.is_some())
                    .map(|i| ReviewableItem {
                        order_id: o.id,
                        item: i.clone(),
                    })
            })
            .collect())
    }

    async fn redeem_review_token(&self, review: NewReview) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Tables {
            orders, products, ..
        } = &mut *tables;

        let item = orders
            .values_mut()
            .filter(|o| o.user_id == review.user)
            .flat_map(|o| o.items.iter_mut())
            .find(|i| i.review_token.as_deref() == Some(review.token.as_str()))
            .ok_or(RepositoryError::NotFound)?;

        let product = products
            .get_mut(&item.product_id)
            .ok_or(RepositoryError::NotFound)?;
        if product.has_review_by(review.user) {
            return Err(RepositoryError::Conflict(
                "product already reviewed by this user".to_owned(),
            ));
        }

        product.reviews.push(Review {
            user: review.user,
            name: review.name,
            rating: review.rating,
            comment: review.comment,
            created_at: Utc::now(),
        });
        let summary = RatingSummary::from_ratings(product.reviews.iter().map(|r| r.rating));
        product.rating = summary.rating;
        product.num_reviews = summary.num_reviews;
        item.review_token = None;

        Ok(product.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use merkato_core::{PaymentMethod, Rating};

    use super::*;
    use crate::models::{Address, OrderItem, ProductAttributes};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Selam".to_string(),
            email: Email::parse(email).unwrap(),
            password_hash: "hash".to_string(),
            telebirr_phone: String::new(),
            verification_token: format!("token-{email}"),
        }
    }

    fn attributes(price: i64) -> ProductAttributes {
        ProductAttributes {
            name: "Netela".to_string(),
            description: "Cotton shawl".to_string(),
            price: Decimal::new(price, 0),
            original_price: None,
            department: "Women".to_string(),
            category: "Clothing".to_string(),
            sub_category: "Shawls".to_string(),
            main_category: None,
            color: None,
            sizes: vec!["One size".to_string()],
            purchase_options: Vec::new(),
            bestseller: false,
        }
    }

    fn line(product: ProductId) -> OrderItem {
        OrderItem {
            product_id: product,
            name: "Netela".to_string(),
            price: Decimal::new(100, 0),
            quantity: 1,
            image: Vec::new(),
            size: None,
            review_token: None,
        }
    }

    async fn delivered_order(store: &MemoryStore, user: UserId, product: ProductId) -> Order {
        let order = store
            .insert_order(NewOrder {
                user_id: user,
                items: vec![line(product)],
                amount: Decimal::new(100, 0),
                address: Address::default(),
                payment_method: PaymentMethod::Cod,
            })
            .await
            .unwrap();
        store
            .advance_status(order.id, OrderStatus::OrderPlaced, OrderStatus::Delivered)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::default();
        store.insert_user(new_user("a@shop.et")).await.unwrap();
        let err = store.insert_user(new_user("a@shop.et")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verification_token_is_single_use() {
        let store = MemoryStore::default();
        store.insert_user(new_user("a@shop.et")).await.unwrap();

        let verified = store.verify_email("token-a@shop.et").await.unwrap().unwrap();
        assert!(verified.is_verified);
        assert!(store.verify_email("token-a@shop.et").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_cart_missing_user() {
        let store = MemoryStore::default();
        let err = store
            .update_cart(UserId::new(42), CartChange::Clear)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_concurrent_cart_adds_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let user = store.insert_user(new_user("a@shop.et")).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update_cart(
                            user.id,
                            CartChange::Add {
                                product: ProductId::new(1),
                                size: "M".to_string(),
                            },
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let cart = store.get_user(user.id).await.unwrap().unwrap().cart;
        assert_eq!(cart.quantity(ProductId::new(1), "M"), 20);
    }

    #[tokio::test]
    async fn test_advance_status_is_conditional() {
        let store = MemoryStore::default();
        let order = delivered_order(&store, UserId::new(1), ProductId::new(1)).await;
        assert!(order.items[0].review_token.is_some());

        let stale = store
            .advance_status(order.id, OrderStatus::OrderPlaced, OrderStatus::Packing)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_redeem_review_token_once() {
        let store = MemoryStore::default();
        let buyer = store.insert_user(new_user("b@shop.et")).await.unwrap();
        let product = store
            .insert_product(NewProduct::new(UserId::new(99), attributes(100), vec![]))
            .await
            .unwrap();
        let order = delivered_order(&store, buyer.id, product.id).await;
        let token = order.items[0].review_token.clone().unwrap();

        let review = NewReview {
            token,
            user: buyer.id,
            name: buyer.name.clone(),
            rating: Rating::new(4).unwrap(),
            comment: "Lovely".to_string(),
        };
        let reviewed = store.redeem_review_token(review.clone()).await.unwrap();
        assert_eq!(reviewed.num_reviews, 1);
        assert!(store.list_reviewable(buyer.id).await.unwrap().is_empty());

        let again = store.redeem_review_token(review).await.unwrap_err();
        assert!(matches!(again, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_products_by_seller() {
        let store = MemoryStore::default();
        let seller = UserId::new(7);
        store
            .insert_product(NewProduct::new(seller, attributes(10), vec![]))
            .await
            .unwrap();
        store
            .insert_product(NewProduct::new(seller, attributes(20), vec![]))
            .await
            .unwrap();
        store
            .insert_product(NewProduct::new(UserId::new(8), attributes(30), vec![]))
            .await
            .unwrap();

        assert_eq!(store.delete_products_by_seller(seller).await.unwrap(), 2);
        assert_eq!(store.list_products().await.unwrap().len(), 1);
    }
}

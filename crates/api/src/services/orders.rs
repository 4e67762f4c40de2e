//! Order service: placement, payment reconciliation and status changes.
//!
//! Orders are always created unpaid in `Order Placed`. Line items are
//! copied from the live product at placement. Gateway placement writes the
//! order first and deletes it again if the gateway call fails.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use merkato_core::{
    AmountOutOfRange, OrderId, OrderStatus, PaymentMethod, ProductId, StatusError, Transition,
    UserId, is_storable_amount, to_minor_units,
};

use crate::config::PaymentsConfig;
use crate::db::{CartChange, OrderStore, ProductStore, UserStore};
use crate::error::AppError;
use crate::models::product::lenient;
use crate::models::{Address, NewOrder, Order, OrderItem, SellerOrder};
use crate::services::payments::{
    CheckoutGateway, CheckoutLine, CheckoutRequest, GatewayOrder, OrderGateway, PaymentError,
};

/// Name of the delivery line on hosted checkout pages.
const DELIVERY_LINE_NAME: &str = "Delivery Charges";

/// One requested line at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    #[serde(alias = "_id")]
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
}

/// Checkout body shared by every payment method.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderRequest {
    pub items: Vec<OrderLineRequest>,
    #[serde(deserialize_with = "lenient::decimal")]
    pub amount: Decimal,
    #[serde(default)]
    pub address: Address,
}

impl OrderRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.items.is_empty() {
            return Err(AppError::Validation("order has no items".to_string()));
        }
        if self.items.iter().any(|line| line.quantity == 0) {
            return Err(AppError::Validation(
                "item quantity must be at least 1".to_string(),
            ));
        }
        if self.amount < Decimal::ZERO {
            return Err(AppError::Validation("amount cannot be negative".to_string()));
        }
        if !is_storable_amount(self.amount) {
            return Err(AmountOutOfRange.into());
        }
        Ok(())
    }
}

pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
    products: &'a dyn ProductStore,
    users: &'a dyn UserStore,
    payments: &'a PaymentsConfig,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(
        orders: &'a dyn OrderStore,
        products: &'a dyn ProductStore,
        users: &'a dyn UserStore,
        payments: &'a PaymentsConfig,
    ) -> Self {
        Self {
            orders,
            products,
            users,
            payments,
        }
    }

    /// Copy each requested line from its live product.
    async fn snapshot(&self, lines: &[OrderLineRequest]) -> Result<Vec<OrderItem>, AppError> {
        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let products = self.products.get_products(&ids).await?;

        lines
            .iter()
            .map(|line| {
                let product = products
                    .iter()
                    .find(|p| p.id == line.product_id)
                    .ok_or_else(|| {
                        AppError::NotFound(format!("product {} not found", line.product_id))
                    })?;
                Ok(OrderItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    price: product.price,
                    quantity: line.quantity,
                    image: product.images.clone(),
                    size: line.size.clone(),
                    review_token: None,
                })
            })
            .collect()
    }

    async fn place(
        &self,
        user: UserId,
        request: OrderRequest,
        payment_method: PaymentMethod,
    ) -> Result<Order, AppError> {
        request.validate()?;
        let items = self.snapshot(&request.items).await?;

        let order = self
            .orders
            .insert_order(NewOrder {
                user_id: user,
                items,
                amount: request.amount,
                address: request.address,
                payment_method,
            })
            .await?;

        info!(order_id = %order.id, user_id = %user, method = %payment_method, "Order placed");
        Ok(order)
    }

    async fn discard(&self, order: OrderId) {
        if let Err(e) = self.orders.delete_order(order).await {
            warn!(order_id = %order, error = %e, "Failed to delete pending order");
        }
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), AppError> {
        self.users.update_cart(user, CartChange::Clear).await?;
        Ok(())
    }

    /// Place a cash-on-delivery order and empty the cart.
    ///
    /// Not idempotent: submitting twice creates two orders.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty or malformed request.
    /// Returns `AppError::NotFound` if a requested product does not exist.
    #[instrument(skip(self, request))]
    pub async fn place_cod(&self, user: UserId, request: OrderRequest) -> Result<Order, AppError> {
        let order = self.place(user, request, PaymentMethod::Cod).await?;
        self.clear_cart(user).await?;
        Ok(order)
    }

    /// Place an order and open a hosted checkout session for it.
    ///
    /// Returns the order and the URL to send the buyer to. The buyer comes
    /// back to `{origin}/verify?success=true|false&orderId={id}`.
    ///
    /// # Errors
    ///
    /// As [`Self::place_cod`], plus `AppError::Payment` if the session cannot
    /// be created, in which case the order is deleted again.
    #[instrument(skip(self, request, gateway))]
    pub async fn place_stripe(
        &self,
        user: UserId,
        request: OrderRequest,
        origin: &str,
        gateway: &dyn CheckoutGateway,
    ) -> Result<(Order, String), AppError> {
        let order = self.place(user, request, PaymentMethod::Stripe).await?;

        let checkout = match self.checkout_request(&order, origin) {
            Ok(checkout) => checkout,
            Err(e) => {
                self.discard(order.id).await;
                return Err(e.into());
            }
        };

        match gateway.create_session(checkout).await {
            Ok(url) => Ok((order, url)),
            Err(e) => {
                self.discard(order.id).await;
                Err(e.into())
            }
        }
    }

    fn checkout_request(&self, order: &Order, origin: &str) -> Result<CheckoutRequest, PaymentError> {
        let minor = |amount: Decimal| {
            to_minor_units(amount)
                .ok_or_else(|| PaymentError::InvalidAmount(amount.to_string()))
        };

        let mut lines = order
            .items
            .iter()
            .map(|item| {
                Ok(CheckoutLine {
                    name: item.name.clone(),
                    unit_amount: minor(item.price)?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, PaymentError>>()?;

        lines.push(CheckoutLine {
            name: DELIVERY_LINE_NAME.to_string(),
            unit_amount: minor(self.payments.delivery_charge)?,
            quantity: 1,
        });

        Ok(CheckoutRequest {
            currency: self.payments.currency,
            lines,
            success_url: format!("{origin}/verify?success=true&orderId={}", order.id),
            cancel_url: format!("{origin}/verify?success=false&orderId={}", order.id),
        })
    }

    /// Place an order and create the matching gateway order.
    ///
    /// # Errors
    ///
    /// As [`Self::place_cod`], plus `AppError::Payment` if the gateway order
    /// cannot be created, in which case the order is deleted again.
    #[instrument(skip(self, request, gateway))]
    pub async fn place_razorpay(
        &self,
        user: UserId,
        request: OrderRequest,
        gateway: &dyn OrderGateway,
    ) -> Result<(Order, GatewayOrder), AppError> {
        let order = self.place(user, request, PaymentMethod::Razorpay).await?;

        let Some(amount) = to_minor_units(order.amount) else {
            self.discard(order.id).await;
            return Err(PaymentError::InvalidAmount(order.amount.to_string()).into());
        };

        match gateway
            .create_order(amount, self.payments.currency, &order.id.to_string())
            .await
        {
            Ok(gateway_order) => Ok((order, gateway_order)),
            Err(e) => {
                self.discard(order.id).await;
                Err(e.into())
            }
        }
    }

    /// Apply the client-reported outcome of a hosted checkout.
    ///
    /// Success marks the order paid and empties the cart. Failure deletes the
    /// order. Returns whether the payment succeeded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the order exists, belongs to
    /// `user` and is still unpaid.
    #[instrument(skip(self))]
    pub async fn verify_stripe(
        &self,
        user: UserId,
        order_id: OrderId,
        success: bool,
    ) -> Result<bool, AppError> {
        let pending = self
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == user && !order.payment)
            .ok_or_else(|| order_not_found(order_id))?;

        if success {
            if !self.orders.mark_paid(pending.id, user).await? {
                return Err(order_not_found(order_id));
            }
            self.clear_cart(user).await?;
            info!(order_id = %order_id, "Stripe payment confirmed");
            Ok(true)
        } else {
            self.orders.delete_unpaid_order(pending.id, user).await?;
            info!(order_id = %order_id, "Stripe payment cancelled, order deleted");
            Ok(false)
        }
    }

    /// Ask the gateway whether its order is paid and reconcile.
    ///
    /// Returns whether the payment succeeded; an unpaid gateway order
    /// changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Payment` if the gateway cannot be reached.
    /// Returns `AppError::NotFound` if the receipt does not name an order of
    /// `user`.
    #[instrument(skip(self, gateway))]
    pub async fn verify_razorpay(
        &self,
        user: UserId,
        gateway_order_id: &str,
        gateway: &dyn OrderGateway,
    ) -> Result<bool, AppError> {
        let gateway_order = gateway.fetch_order(gateway_order_id).await?;
        if !gateway_order.is_paid() {
            return Ok(false);
        }

        let order_id: OrderId = gateway_order
            .receipt
            .as_deref()
            .and_then(|receipt| receipt.parse().ok())
            .ok_or_else(|| AppError::NotFound("no order for this payment".to_string()))?;

        if !self.orders.mark_paid(order_id, user).await? {
            return Err(order_not_found(order_id));
        }
        self.clear_cart(user).await?;
        info!(order_id = %order_id, "Razorpay payment confirmed");
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn buyer_orders(&self, user: UserId) -> Result<Vec<Order>, AppError> {
        Ok(self.orders.list_orders_by_user(user).await?)
    }

    /// Orders containing the seller's products, each reduced to the
    /// seller's own lines.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails, or
    /// `AppError::Validation` if a seller total overflows.
    pub async fn seller_orders(&self, seller: UserId) -> Result<Vec<SellerOrder>, AppError> {
        let products: BTreeSet<ProductId> = self
            .products
            .list_products_by_seller(seller)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ProductId> = products.iter().copied().collect();
        let orders = self.orders.list_orders_with_products(&ids).await?;

        let mut projected = Vec::with_capacity(orders.len());
        for order in &orders {
            if let Some(view) = SellerOrder::project(order, &products)? {
                projected.push(view);
            }
        }
        Ok(projected)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn all_orders(&self) -> Result<Vec<Order>, AppError> {
        Ok(self.orders.list_orders().await?)
    }

    /// Move an order forward in its lifecycle.
    ///
    /// Setting the current status again is a no-op. Entering `Delivered`
    /// makes every line reviewable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown status.
    /// Returns `AppError::NotFound` if the order does not exist.
    /// Returns `AppError::Conflict` for a backward move or if the order
    /// changed status concurrently.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: &str) -> Result<Order, AppError> {
        let next: OrderStatus = status
            .parse()
            .map_err(|e: StatusError| AppError::Validation(e.to_string()))?;

        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;

        match order.status.transition_to(next) {
            Ok(Transition::Unchanged) => Ok(order),
            Ok(Transition::Advance) => {
                let updated = self
                    .orders
                    .advance_status(order_id, order.status, next)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict("order status changed concurrently".to_string())
                    })?;
                info!(order_id = %order_id, from = %order.status, to = %next, "Order status updated");
                Ok(updated)
            }
            Err(e) => Err(AppError::Conflict(e.to_string())),
        }
    }
}

fn order_not_found(id: OrderId) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use merkato_core::{Currency, Email};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, NewUser, ProductAttributes};
    use crate::services::payments::{MockCheckoutGateway, MockOrderGateway};

    fn payments() -> PaymentsConfig {
        PaymentsConfig {
            currency: Currency::Etb,
            delivery_charge: Decimal::new(50, 0),
            stripe_secret_key: None,
            razorpay: None,
        }
    }

    async fn buyer(store: &MemoryStore) -> UserId {
        let user = store
            .insert_user(NewUser {
                name: "Dawit".to_string(),
                email: Email::parse("dawit@shop.et").unwrap(),
                password_hash: "hash".to_string(),
                telebirr_phone: String::new(),
                verification_token: "token".to_string(),
            })
            .await
            .unwrap();
        user.id
    }

    async fn product(store: &MemoryStore, seller: i32, name: &str, price: i64) -> ProductId {
        store
            .insert_product(NewProduct::new(
                UserId::new(seller),
                ProductAttributes {
                    name: name.to_string(),
                    description: "Item".to_string(),
                    price: Decimal::new(price, 0),
                    original_price: None,
                    department: "Men".to_string(),
                    category: "Clothing".to_string(),
                    sub_category: "Shirts".to_string(),
                    main_category: None,
                    color: None,
                    sizes: vec!["M".to_string()],
                    purchase_options: Vec::new(),
                    bestseller: false,
                },
                vec![format!("https://cdn.example/{name}.jpg")],
            ))
            .await
            .unwrap()
            .id
    }

    fn request(lines: &[(ProductId, u32)], amount: i64) -> OrderRequest {
        OrderRequest {
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLineRequest {
                    product_id: *product_id,
                    quantity: *quantity,
                    size: Some("M".to_string()),
                })
                .collect(),
            amount: Decimal::new(amount, 0),
            address: Address::default(),
        }
    }

    #[tokio::test]
    async fn test_cod_order_snapshots_and_clears_cart() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        store
            .update_cart(user, CartChange::Add { product: p, size: "M".to_string() })
            .await
            .unwrap();
        let service = OrderService::new(&store, &store, &store, &payments);

        let order = service.place_cod(user, request(&[(p, 2)], 200)).await.unwrap();

        assert!(!order.payment);
        assert_eq!(order.payment_method, PaymentMethod::Cod);
        assert_eq!(order.status, OrderStatus::OrderPlaced);
        assert_eq!(order.amount, Decimal::new(200, 0));
        assert_eq!(order.items[0].name, "Shirt");
        assert_eq!(order.items[0].price, Decimal::new(100, 0));
        assert!(store.get_user(user).await.unwrap().unwrap().cart.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_survives_product_edit() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let order = service.place_cod(user, request(&[(p, 1)], 100)).await.unwrap();
        store
            .update_product(
                p,
                &crate::models::ProductPatch {
                    price: Some(Decimal::new(999, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items[0].price, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let err = service
            .place_cod(user, request(&[(ProductId::new(404), 1)], 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stripe_session_lines_and_urls() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let mut gateway = MockCheckoutGateway::new();
        gateway
            .expect_create_session()
            .withf(|req| {
                req.lines.len() == 2
                    && req.lines[0].unit_amount == 10_000
                    && req.lines[0].quantity == 2
                    && req.lines[1].unit_amount == 5_000
                    && req.success_url == "https://merkato.et/verify?success=true&orderId=1"
                    && req.cancel_url == "https://merkato.et/verify?success=false&orderId=1"
            })
            .times(1)
            .returning(|_| Ok("https://checkout.stripe.com/c/pay/cs_test".to_string()));

        let (order, url) = service
            .place_stripe(user, request(&[(p, 2)], 250), "https://merkato.et", &gateway)
            .await
            .unwrap();
        assert_eq!(order.payment_method, PaymentMethod::Stripe);
        assert!(url.starts_with("https://checkout.stripe.com"));
    }

    #[tokio::test]
    async fn test_gateway_failure_deletes_pending_order() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let mut gateway = MockCheckoutGateway::new();
        gateway
            .expect_create_session()
            .returning(|_| Err(PaymentError::Api("card_declined".to_string())));

        let err = service
            .place_stripe(user, request(&[(p, 1)], 150), "https://merkato.et", &gateway)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Payment(_)));
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_stripe_failure_deletes_order() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        let order = service.place(user, request(&[(p, 1)], 150), PaymentMethod::Stripe).await.unwrap();

        assert!(!service.verify_stripe(user, order.id, false).await.unwrap());
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_stripe_requires_own_unpaid_order() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        let order = service.place(user, request(&[(p, 1)], 150), PaymentMethod::Stripe).await.unwrap();

        let stranger = service
            .verify_stripe(UserId::new(999), order.id, false)
            .await
            .unwrap_err();
        assert!(matches!(stranger, AppError::NotFound(_)));
        assert!(store.get_order(order.id).await.unwrap().is_some());

        assert!(service.verify_stripe(user, order.id, true).await.unwrap());
        assert!(store.get_order(order.id).await.unwrap().unwrap().payment);

        let paid = service.verify_stripe(user, order.id, false).await.unwrap_err();
        assert!(matches!(paid, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_razorpay_paid_and_unpaid() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        let order = service.place(user, request(&[(p, 1)], 150), PaymentMethod::Razorpay).await.unwrap();

        let receipt = order.id.to_string();
        let mut gateway = MockOrderGateway::new();
        gateway.expect_fetch_order().returning(move |id| {
            Ok(GatewayOrder {
                id: id.to_string(),
                amount: 15_000,
                currency: "ETB".to_string(),
                receipt: Some(receipt.clone()),
                status: if id == "order_paid" { "paid" } else { "created" }.to_string(),
            })
        });

        assert!(!service.verify_razorpay(user, "order_open", &gateway).await.unwrap());
        assert!(!store.get_order(order.id).await.unwrap().unwrap().payment);

        assert!(service.verify_razorpay(user, "order_paid", &gateway).await.unwrap());
        assert!(store.get_order(order.id).await.unwrap().unwrap().payment);
    }

    #[tokio::test]
    async fn test_razorpay_order_uses_minor_units_and_receipt() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_create_order()
            .withf(|amount, currency, receipt| {
                *amount == 15_050 && *currency == Currency::Etb && receipt == "1"
            })
            .returning(|amount, currency, receipt| {
                Ok(GatewayOrder {
                    id: "order_1".to_string(),
                    amount,
                    currency: currency.upper_code().to_string(),
                    receipt: Some(receipt.to_string()),
                    status: "created".to_string(),
                })
            });

        let mut req = request(&[(p, 1)], 0);
        req.amount = Decimal::new(15_050, 2);
        let (_, gateway_order) = service.place_razorpay(user, req, &gateway).await.unwrap();
        assert_eq!(gateway_order.currency, "ETB");
    }

    #[tokio::test]
    async fn test_seller_view_projects_own_lines() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let mine = product(&store, 7, "P", 50).await;
        let theirs = product(&store, 8, "Q", 30).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        service
            .place_cod(user, request(&[(mine, 1), (theirs, 1)], 80))
            .await
            .unwrap();

        let view = service.seller_orders(UserId::new(7)).await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].items.len(), 1);
        assert_eq!(view[0].items[0].product_id, mine);
        assert_eq!(view[0].amount, Decimal::new(50, 0));
        assert_eq!(view[0].buyer_user_id, user);

        assert!(service.seller_orders(UserId::new(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_amount_is_rejected_before_gateway() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);

        let mut gateway = MockOrderGateway::new();
        gateway.expect_create_order().never();

        let mut req = request(&[(p, 1)], 0);
        req.amount = Decimal::MAX;
        let err = service.place_razorpay(user, req, &gateway).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut req = request(&[(p, 1)], 0);
        req.amount = merkato_core::MAX_AMOUNT + Decimal::new(1, 2);
        let err = service.place_cod(user, req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seller_view_reports_overflowing_total() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        service.place_cod(user, request(&[(p, 2)], 200)).await.unwrap();

        // a stored price that never went through listing validation
        store
            .update_product(
                p,
                &crate::models::ProductPatch {
                    price: Some(Decimal::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.place_cod(user, request(&[(p, 2)], 200)).await.unwrap();

        let err = service.seller_orders(UserId::new(7)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_updates_are_forward_only() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        let order = service.place_cod(user, request(&[(p, 1)], 100)).await.unwrap();

        let shipped = service.update_status(order.id, "Shipped").await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);

        let same = service.update_status(order.id, "Shipped").await.unwrap();
        assert_eq!(same.status, OrderStatus::Shipped);

        let back = service.update_status(order.id, "Packing").await.unwrap_err();
        assert!(matches!(back, AppError::Conflict(_)));

        let unknown = service.update_status(order.id, "Lost").await.unwrap_err();
        assert!(matches!(unknown, AppError::Validation(_)));

        let missing = service
            .update_status(OrderId::new(404), "Packing")
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delivery_stamps_review_tokens() {
        let store = MemoryStore::default();
        let payments = payments();
        let user = buyer(&store).await;
        let p = product(&store, 7, "Shirt", 100).await;
        let service = OrderService::new(&store, &store, &store, &payments);
        let order = service.place_cod(user, request(&[(p, 1)], 100)).await.unwrap();
        assert!(order.items[0].review_token.is_none());

        let delivered = service.update_status(order.id, "Delivered").await.unwrap();
        assert!(delivered.items[0].review_token.is_some());
    }

    #[test]
    fn test_order_request_accepts_client_shapes() {
        let request: OrderRequest = serde_json::from_str(
            r#"{"items":[{"_id":3,"quantity":2,"size":"M","name":"ignored"}],
                "amount":"250","address":{"firstName":"Sara","city":"Addis Ababa"}}"#,
        )
        .unwrap();
        assert_eq!(request.items[0].product_id, ProductId::new(3));
        assert_eq!(request.amount, Decimal::new(250, 0));
        assert_eq!(request.address.city, "Addis Ababa");
    }
}

//! Product domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use merkato_core::{MAX_AMOUNT, ProductId, Rating, UserId, is_storable_amount, sale_price};

/// Maximum number of images per product.
pub const MAX_IMAGES: usize = 4;

/// A listed product with its embedded reviews.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Set only while strictly greater than `price`.
    #[serde(rename = "original_price", with = "rust_decimal::serde::float_option")]
    pub original_price: Option<Decimal>,
    #[serde(rename = "image")]
    pub images: Vec<String>,
    pub department: String,
    pub category: String,
    pub sub_category: String,
    pub main_category: Option<String>,
    pub color: Option<String>,
    pub sizes: Vec<String>,
    pub purchase_options: Vec<String>,
    pub bestseller: bool,
    pub date: DateTime<Utc>,
    pub rating: f64,
    pub num_reviews: u32,
    pub reviews: Vec<Review>,
}

impl Product {
    /// Whether the listing shows a discount.
    #[must_use]
    pub const fn is_on_sale(&self) -> bool {
        self.original_price.is_some()
    }

    /// Whether `user` has already reviewed this product.
    #[must_use]
    pub fn has_review_by(&self, user: UserId) -> bool {
        self.reviews.iter().any(|review| review.user == user)
    }
}

/// A buyer's review, embedded in its product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user: UserId,
    pub name: String,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A review being redeemed against a review token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub token: String,
    pub user: UserId,
    /// Reviewer display name, copied from the account.
    pub name: String,
    pub rating: Rating,
    pub comment: String,
}

/// Listing attributes submitted with a new product, before images are
/// uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductAttributes {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub department: String,
    pub category: String,
    pub sub_category: String,
    pub main_category: Option<String>,
    pub color: Option<String>,
    pub sizes: Vec<String>,
    pub purchase_options: Vec<String>,
    pub bestseller: bool,
}

impl ProductAttributes {
    /// Check required fields and the price.
    ///
    /// # Errors
    ///
    /// Returns a client-facing message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("name", &self.name),
            ("description", &self.description),
            ("department", &self.department),
            ("category", &self.category),
            ("subCategory", &self.sub_category),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("{field} is required"));
        }
        if self.price <= Decimal::ZERO {
            return Err("price must be greater than zero".to_string());
        }
        check_range(Some(self.price), self.original_price)
    }
}

fn check_range(price: Option<Decimal>, original_price: Option<Decimal>) -> Result<(), String> {
    if price.is_some_and(|p| !is_storable_amount(p)) {
        return Err(format!("price cannot exceed {MAX_AMOUNT}"));
    }
    if original_price.is_some_and(|p| !is_storable_amount(p)) {
        return Err(format!("original_price must be between 0 and {MAX_AMOUNT}"));
    }
    Ok(())
}

/// A product ready to persist: owner assigned, images uploaded, on-sale
/// rule applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub seller_id: UserId,
    pub attributes: ProductAttributes,
    pub images: Vec<String>,
}

impl NewProduct {
    #[must_use]
    pub fn new(seller_id: UserId, mut attributes: ProductAttributes, images: Vec<String>) -> Self {
        attributes.original_price = sale_price(attributes.price, attributes.original_price);
        Self {
            seller_id,
            attributes,
            images,
        }
    }
}

/// Partial update of a product by its owner.
///
/// Absent fields are kept, except `original_price`: it survives only when
/// sent and strictly greater than the effective price.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_decimal")]
    pub price: Option<Decimal>,
    #[serde(
        default,
        rename = "original_price",
        deserialize_with = "lenient::optional_decimal"
    )]
    pub original_price: Option<Decimal>,
    pub department: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub main_category: Option<String>,
    pub color: Option<String>,
    pub sizes: Option<Vec<String>>,
    pub purchase_options: Option<Vec<String>>,
    pub bestseller: Option<bool>,
}

impl ProductPatch {
    /// # Errors
    ///
    /// Returns a client-facing message for a blank name or a price out of
    /// range.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("name cannot be blank".to_string());
        }
        if self.price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err("price must be greater than zero".to_string());
        }
        check_range(self.price, self.original_price)
    }

    /// Apply the patch, including the on-sale rule.
    ///
    /// Applying the same patch twice leaves the product as after the first.
    pub fn apply(&self, product: &mut Product) {
        fn set<T: Clone>(target: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }

        set(&mut product.name, self.name.as_ref());
        set(&mut product.description, self.description.as_ref());
        set(&mut product.price, self.price.as_ref());
        set(&mut product.department, self.department.as_ref());
        set(&mut product.category, self.category.as_ref());
        set(&mut product.sub_category, self.sub_category.as_ref());
        set(&mut product.sizes, self.sizes.as_ref());
        set(&mut product.purchase_options, self.purchase_options.as_ref());
        set(&mut product.bestseller, self.bestseller.as_ref());
        if self.main_category.is_some() {
            product.main_category.clone_from(&self.main_category);
        }
        if self.color.is_some() {
            product.color.clone_from(&self.color);
        }

        product.original_price = sale_price(product.price, self.original_price);
    }
}

/// Deserializers for numbers that browsers send as strings.
pub(crate) mod lenient {
    use super::{Decimal, Deserialize, Deserializer};

    /// Accepts a JSON number, a numeric string, `""` or `null`.
    pub fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Number(n) => n.to_string().parse().map(Some).map_err(D::Error::custom),
            serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
            serde_json::Value::String(s) => s.trim().parse().map(Some).map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected a number, got {other}"))),
        }
    }

    /// Like [`optional_decimal`] but the value must be present.
    pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        optional_decimal(deserializer)?
            .ok_or_else(|| serde::de::Error::custom("expected a number"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub fn sample_product(id: i32, seller: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            seller_id: UserId::new(seller),
            name: format!("Product {id}"),
            description: "Handwoven cotton".to_string(),
            price: Decimal::new(price, 0),
            original_price: None,
            images: vec!["https://img.example/1.jpg".to_string()],
            department: "Women".to_string(),
            category: "Clothing".to_string(),
            sub_category: "Dresses".to_string(),
            main_category: None,
            color: None,
            sizes: vec!["M".to_string()],
            purchase_options: Vec::new(),
            bestseller: false,
            date: Utc::now(),
            rating: 0.0,
            num_reviews: 0,
            reviews: Vec::new(),
        }
    }

    fn patch(json: &str) -> ProductPatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_patch_keeps_real_discount() {
        let mut product = sample_product(1, 1, 100);
        patch(r#"{"price": 80, "original_price": 120}"#).apply(&mut product);
        assert_eq!(product.price, Decimal::new(80, 0));
        assert_eq!(product.original_price, Some(Decimal::new(120, 0)));
        assert!(product.is_on_sale());
    }

    #[test]
    fn test_patch_clears_original_when_not_discounted() {
        let mut product = sample_product(1, 1, 100);
        product.original_price = Some(Decimal::new(150, 0));

        patch(r#"{"price": 200, "original_price": 150}"#).apply(&mut product);
        assert_eq!(product.original_price, None);
    }

    #[test]
    fn test_patch_without_original_clears_it() {
        let mut product = sample_product(1, 1, 100);
        product.original_price = Some(Decimal::new(150, 0));

        patch(r#"{"name": "Renamed"}"#).apply(&mut product);
        assert_eq!(product.name, "Renamed");
        assert_eq!(product.original_price, None);
    }

    #[test]
    fn test_patch_uses_current_price_when_absent() {
        let mut product = sample_product(1, 1, 100);
        patch(r#"{"original_price": "130"}"#).apply(&mut product);
        assert_eq!(product.original_price, Some(Decimal::new(130, 0)));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut product = sample_product(1, 1, 100);
        let update = patch(r#"{"price": "90", "original_price": "110"}"#);
        update.apply(&mut product);
        let once = product.clone();
        update.apply(&mut product);
        assert_eq!(product, once);
    }

    #[test]
    fn test_lenient_decimal_accepts_form_values() {
        let update = patch(r#"{"price": "19.99", "original_price": ""}"#);
        assert_eq!(update.price, Some(Decimal::new(1999, 2)));
        assert_eq!(update.original_price, None);

        assert!(serde_json::from_str::<ProductPatch>(r#"{"price": "cheap"}"#).is_err());
    }

    #[test]
    fn test_patch_validate() {
        assert!(patch(r#"{"price": 0}"#).validate().is_err());
        assert!(patch(r#"{"name": "  "}"#).validate().is_err());
        assert!(patch(r#"{"price": 5}"#).validate().is_ok());
    }

    #[test]
    fn test_prices_must_fit_storage() {
        assert!(patch(r#"{"price": "9999999999.99"}"#).validate().is_ok());
        assert!(patch(r#"{"price": "10000000000"}"#).validate().is_err());
        assert!(
            patch(r#"{"price": 5, "original_price": "79228162514264337593543950335"}"#)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_new_product_applies_sale_rule() {
        let attributes = ProductAttributes {
            name: "Scarf".to_string(),
            description: "Wool".to_string(),
            price: Decimal::new(300, 0),
            original_price: Some(Decimal::new(250, 0)),
            department: "Men".to_string(),
            category: "Accessories".to_string(),
            sub_category: "Scarves".to_string(),
            main_category: None,
            color: None,
            sizes: Vec::new(),
            purchase_options: Vec::new(),
            bestseller: false,
        };
        assert!(attributes.validate().is_ok());

        let too_dear = ProductAttributes {
            price: Decimal::MAX,
            ..attributes.clone()
        };
        assert!(too_dear.validate().is_err());
        let fake_original = ProductAttributes {
            original_price: Some(MAX_AMOUNT + Decimal::ONE),
            ..attributes.clone()
        };
        assert!(fake_original.validate().is_err());

        let product = NewProduct::new(UserId::new(3), attributes, vec!["u".to_string()]);
        assert_eq!(product.attributes.original_price, None);
    }
}

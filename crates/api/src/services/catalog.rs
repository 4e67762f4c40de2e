//! Catalog service: listings, ownership and the on-sale rule.

use futures::future::try_join_all;
use tracing::{info, instrument};

use merkato_core::{ProductId, UserId};

use crate::db::{ProductStore, UserStore};
use crate::error::AppError;
use crate::models::{MAX_IMAGES, NewProduct, Product, ProductAttributes, ProductPatch};
use crate::services::images::{ImageStore, ImageUpload};

/// Product operations for sellers, the operator and the public catalog.
pub struct CatalogService<'a> {
    products: &'a dyn ProductStore,
    users: &'a dyn UserStore,
    images: &'a dyn ImageStore,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(
        products: &'a dyn ProductStore,
        users: &'a dyn UserStore,
        images: &'a dyn ImageStore,
    ) -> Self {
        Self {
            products,
            users,
            images,
        }
    }

    /// Create a listing owned by `owner`.
    ///
    /// Every image is uploaded before anything is stored; one failed upload
    /// aborts the whole operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for invalid attributes or image count.
    /// Returns `AppError::Upload` if any upload fails.
    #[instrument(skip(self, attributes, images), fields(images = images.len()))]
    pub async fn add_product(
        &self,
        owner: UserId,
        attributes: ProductAttributes,
        images: Vec<ImageUpload>,
    ) -> Result<Product, AppError> {
        attributes.validate().map_err(AppError::Validation)?;
        if images.is_empty() {
            return Err(AppError::Validation(
                "at least one image is required".to_string(),
            ));
        }
        if images.len() > MAX_IMAGES {
            return Err(AppError::Validation(format!(
                "at most {MAX_IMAGES} images are allowed"
            )));
        }

        let urls = try_join_all(images.into_iter().map(|image| self.images.upload(image))).await?;

        let product = self
            .products
            .insert_product(NewProduct::new(owner, attributes, urls))
            .await?;

        info!(product_id = %product.id, seller_id = %owner, "Product added");
        Ok(product)
    }

    /// Create a listing on behalf of an existing seller account.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `seller` does not exist, otherwise as
    /// [`Self::add_product`].
    pub async fn add_product_for(
        &self,
        seller: UserId,
        attributes: ProductAttributes,
        images: Vec<ImageUpload>,
    ) -> Result<Product, AppError> {
        if self.users.get_user(seller).await?.is_none() {
            return Err(AppError::NotFound(format!("user {seller} not found")));
        }
        self.add_product(seller, attributes, images).await
    }

    /// Load a product and check that `requester` owns it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the product does not exist.
    /// Returns `AppError::Forbidden` if it belongs to someone else.
    pub async fn owned_product(
        &self,
        requester: UserId,
        id: ProductId,
    ) -> Result<Product, AppError> {
        let product = self.get(id).await?;
        if product.seller_id != requester {
            return Err(AppError::Forbidden(
                "you can only modify your own products".to_string(),
            ));
        }
        Ok(product)
    }

    /// Apply `patch` to a product the requester owns.
    ///
    /// # Errors
    ///
    /// As [`Self::owned_product`], plus `AppError::Validation` for an
    /// invalid patch.
    #[instrument(skip(self, patch))]
    pub async fn update_owned_product(
        &self,
        requester: UserId,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, AppError> {
        patch.validate().map_err(AppError::Validation)?;
        self.owned_product(requester, id).await?;

        self.products
            .update_product(id, patch)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    /// Delete a product the requester owns. Order snapshots are untouched.
    ///
    /// # Errors
    ///
    /// As [`Self::owned_product`].
    #[instrument(skip(self))]
    pub async fn delete_owned_product(
        &self,
        requester: UserId,
        id: ProductId,
    ) -> Result<(), AppError> {
        self.owned_product(requester, id).await?;
        self.remove_product(id).await
    }

    /// Delete any product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the product does not exist.
    pub async fn remove_product(&self, id: ProductId) -> Result<(), AppError> {
        if self.products.delete_product(id).await? {
            info!(product_id = %id, "Product removed");
            Ok(())
        } else {
            Err(product_not_found(id))
        }
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the product does not exist.
    pub async fn get(&self, id: ProductId) -> Result<Product, AppError> {
        self.products
            .get_product(id)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, AppError> {
        Ok(self.products.list_products().await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the store fails.
    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Product>, AppError> {
        Ok(self.products.list_products_by_seller(owner).await?)
    }
}

fn product_not_found(id: ProductId) -> AppError {
    AppError::NotFound(format!("product {id} not found"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::{MemoryStore, MockProductStore, MockUserStore};
    use crate::models::product::tests::sample_product;
    use crate::services::images::{MockImageStore, UploadError};

    fn attributes() -> ProductAttributes {
        ProductAttributes {
            name: "Habesha kemis".to_string(),
            description: "Handwoven dress".to_string(),
            price: Decimal::new(100, 0),
            original_price: Some(Decimal::new(150, 0)),
            department: "Women".to_string(),
            category: "Clothing".to_string(),
            sub_category: "Dresses".to_string(),
            main_category: None,
            color: Some("White".to_string()),
            sizes: vec!["S".to_string(), "M".to_string()],
            purchase_options: Vec::new(),
            bestseller: false,
        }
    }

    fn image(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            content_type: Some("image/jpeg".to_string()),
            bytes: vec![0xFF, 0xD8],
        }
    }

    fn uploader() -> MockImageStore {
        let mut images = MockImageStore::new();
        images
            .expect_upload()
            .returning(|image| Ok(format!("https://cdn.example/{}", image.file_name)));
        images
    }

    #[tokio::test]
    async fn test_add_product_uploads_then_persists() {
        let store = MemoryStore::default();
        let images = uploader();
        let catalog = CatalogService::new(&store, &store, &images);

        let product = catalog
            .add_product(UserId::new(3), attributes(), vec![image("a.jpg"), image("b.jpg")])
            .await
            .unwrap();

        assert_eq!(product.seller_id, UserId::new(3));
        assert_eq!(
            product.images,
            vec!["https://cdn.example/a.jpg", "https://cdn.example/b.jpg"]
        );
        assert_eq!(product.original_price, Some(Decimal::new(150, 0)));
    }

    #[tokio::test]
    async fn test_add_product_upload_failure_persists_nothing() {
        let mut products = MockProductStore::new();
        products.expect_insert_product().never();
        let users = MockUserStore::new();
        let mut images = MockImageStore::new();
        images
            .expect_upload()
            .returning(|_| Err(UploadError::Api("quota exceeded".to_string())));
        let catalog = CatalogService::new(&products, &users, &images);

        let err = catalog
            .add_product(UserId::new(3), attributes(), vec![image("a.jpg")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }

    #[tokio::test]
    async fn test_add_product_image_count() {
        let store = MemoryStore::default();
        let images = uploader();
        let catalog = CatalogService::new(&store, &store, &images);

        let none = catalog
            .add_product(UserId::new(3), attributes(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(none, AppError::Validation(_)));

        let five = (0..5).map(|i| image(&format!("{i}.jpg"))).collect();
        let too_many = catalog
            .add_product(UserId::new(3), attributes(), five)
            .await
            .unwrap_err();
        assert!(matches!(too_many, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_product_for_unknown_seller() {
        let store = MemoryStore::default();
        let images = uploader();
        let catalog = CatalogService::new(&store, &store, &images);

        let err = catalog
            .add_product_for(UserId::new(77), attributes(), vec![image("a.jpg")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_non_owner_update_is_forbidden() {
        let mut products = MockProductStore::new();
        products
            .expect_get_product()
            .returning(|_| Ok(Some(sample_product(1, 10, 100))));
        products.expect_update_product().never();
        let users = MockUserStore::new();
        let images = MockImageStore::new();
        let catalog = CatalogService::new(&products, &users, &images);

        let patch = ProductPatch {
            name: Some("Stolen".to_string()),
            ..ProductPatch::default()
        };
        let err = catalog
            .update_owned_product(UserId::new(11), ProductId::new(1), &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_owner_update_applies_sale_rule() {
        let store = MemoryStore::default();
        let images = uploader();
        let catalog = CatalogService::new(&store, &store, &images);
        let product = catalog
            .add_product(UserId::new(3), attributes(), vec![image("a.jpg")])
            .await
            .unwrap();

        let patch = ProductPatch {
            price: Some(Decimal::new(200, 0)),
            original_price: Some(Decimal::new(150, 0)),
            ..ProductPatch::default()
        };
        let updated = catalog
            .update_owned_product(UserId::new(3), product.id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.price, Decimal::new(200, 0));
        assert_eq!(updated.original_price, None);

        let again = catalog
            .update_owned_product(UserId::new(3), product.id, &patch)
            .await
            .unwrap();
        assert_eq!(again, updated);
    }

    #[tokio::test]
    async fn test_delete_missing_product() {
        let store = MemoryStore::default();
        let images = MockImageStore::new();
        let catalog = CatalogService::new(&store, &store, &images);

        let err = catalog
            .delete_owned_product(UserId::new(1), ProductId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

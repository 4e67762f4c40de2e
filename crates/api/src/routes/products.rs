//! Product route handlers.
//!
//! Listings are created from multipart forms: text fields for the
//! attributes and up to four file fields `image1`..`image4`.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    routing::{delete, get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use merkato_core::{ProductId, UserId};

use crate::error::AppError;
use crate::middleware::{RequireAdmin, RequireSeller};
use crate::models::{MAX_IMAGES, Product, ProductAttributes, ProductPatch};
use crate::routes::{ApiJson, ApiPath, Message, Success, ok};
use crate::services::CatalogService;
use crate::services::images::ImageUpload;
use crate::state::AppState;

/// Upper bound for one multipart product form.
const MAX_FORM_BYTES: usize = 20 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    let uploads = Router::new()
        .route("/add", post(admin_add))
        .route("/user/add", post(seller_add))
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES));

    Router::new()
        .merge(uploads)
        .route("/remove", post(admin_remove))
        .route("/list-by-user/{user_id}", get(admin_list_by_user))
        .route("/single", post(single))
        .route("/list", get(list))
        .route("/user/list", get(seller_list))
        .route("/user/update/{product_id}", put(seller_update))
        .route("/user/delete/{product_id}", delete(seller_delete))
}

fn catalog(state: &AppState) -> CatalogService<'_> {
    CatalogService::new(
        state.repos().products.as_ref(),
        state.repos().users.as_ref(),
        state.images(),
    )
}

/// A parsed product form.
#[derive(Debug)]
struct ProductForm {
    attributes: ProductAttributes,
    images: Vec<ImageUpload>,
    seller_id: Option<UserId>,
}

/// Text fields collected before validation.
#[derive(Debug, Default)]
struct RawFields {
    name: String,
    description: String,
    price: String,
    original_price: String,
    department: String,
    category: String,
    sub_category: String,
    main_category: String,
    color: String,
    sizes: String,
    purchase_options: String,
    bestseller: String,
    seller_id: String,
}

impl RawFields {
    fn slot(&mut self, name: &str) -> Option<&mut String> {
        Some(match name {
            "name" => &mut self.name,
            "description" => &mut self.description,
            "price" => &mut self.price,
            "original_price" | "originalPrice" => &mut self.original_price,
            "department" => &mut self.department,
            "category" => &mut self.category,
            "subCategory" => &mut self.sub_category,
            "mainCategory" => &mut self.main_category,
            "color" => &mut self.color,
            "sizes" => &mut self.sizes,
            "purchaseOptions" => &mut self.purchase_options,
            "bestseller" => &mut self.bestseller,
            "sellerId" => &mut self.seller_id,
            _ => return None,
        })
    }

    fn into_form(self, images: Vec<ImageUpload>) -> Result<ProductForm, AppError> {
        let price = parse_decimal("price", &self.price)?
            .ok_or_else(|| AppError::Validation("price is required".to_string()))?;
        let original_price = parse_decimal("original_price", &self.original_price)?;
        let seller_id = match self.seller_id.trim() {
            "" => None,
            raw => Some(raw.parse::<UserId>().map_err(|_| {
                AppError::Validation(format!("invalid sellerId '{raw}'"))
            })?),
        };

        let attributes = ProductAttributes {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            price,
            original_price,
            department: self.department.trim().to_string(),
            category: self.category.trim().to_string(),
            sub_category: self.sub_category.trim().to_string(),
            main_category: non_blank(self.main_category),
            color: non_blank(self.color),
            sizes: parse_list("sizes", &self.sizes)?,
            purchase_options: parse_list("purchaseOptions", &self.purchase_options)?,
            bestseller: matches!(self.bestseller.trim(), "true" | "1" | "on"),
        };

        Ok(ProductForm {
            attributes,
            images,
            seller_id,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_decimal(field: &str, raw: &str) -> Result<Option<Decimal>, AppError> {
    match raw.trim() {
        "" => Ok(None),
        value => value
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{field} must be a number"))),
    }
}

/// Parse a JSON list of strings; an absent field is an empty list.
fn parse_list(field: &str, raw: &str) -> Result<Vec<String>, AppError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .map_err(|_| AppError::Validation(format!("{field} must be a JSON list of strings")))
}

/// Read a product form, keeping non-empty `image1`..`image4` files.
async fn read_product_form(mut multipart: Multipart) -> Result<ProductForm, AppError> {
    let mut fields = RawFields::default();
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if let Some(index) = name
            .strip_prefix("image")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=MAX_IMAGES).contains(n))
        {
            let file_name = field
                .file_name()
                .map_or_else(|| format!("image{index}"), str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await?;
            if !bytes.is_empty() {
                images.push(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        if let Some(slot) = fields.slot(&name) {
            *slot = field.text().await?;
        }
    }

    fields.into_form(images)
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

/// Add a product on behalf of the seller named by `sellerId`.
#[instrument(skip_all)]
async fn admin_add(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Success<ProductResponse>>, AppError> {
    let form = read_product_form(multipart?).await?;
    let seller = form
        .seller_id
        .ok_or_else(|| AppError::Validation("sellerId is required".to_string()))?;

    let product = catalog(&state)
        .add_product_for(seller, form.attributes, form.images)
        .await?;
    Ok(ok(ProductResponse { product }))
}

#[instrument(skip_all, fields(seller_id = %seller.id))]
async fn seller_add(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Success<ProductResponse>>, AppError> {
    let form = read_product_form(multipart?).await?;
    let product = catalog(&state)
        .add_product(seller.id, form.attributes, form.images)
        .await?;
    Ok(ok(ProductResponse { product }))
}

/// Body naming one product.
#[derive(Debug, Deserialize)]
pub struct ProductRef {
    #[serde(alias = "productId", alias = "_id")]
    pub id: ProductId,
}

#[instrument(skip(state, _admin))]
async fn admin_remove(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiJson(request): ApiJson<ProductRef>,
) -> Result<Json<Success<Message>>, AppError> {
    catalog(&state).remove_product(request.id).await?;
    Ok(ok(Message::new("Product removed")))
}

async fn admin_list_by_user(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Success<ProductsResponse>>, AppError> {
    let products = catalog(&state).list_by_owner(user_id).await?;
    Ok(ok(ProductsResponse { products }))
}

async fn single(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProductRef>,
) -> Result<Json<Success<ProductResponse>>, AppError> {
    let product = catalog(&state).get(request.id).await?;
    Ok(ok(ProductResponse { product }))
}

async fn list(State(state): State<AppState>) -> Result<Json<Success<ProductsResponse>>, AppError> {
    let products = catalog(&state).list_all().await?;
    Ok(ok(ProductsResponse { products }))
}

async fn seller_list(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
) -> Result<Json<Success<ProductsResponse>>, AppError> {
    let products = catalog(&state).list_by_owner(seller.id).await?;
    Ok(ok(ProductsResponse { products }))
}

#[instrument(skip(state, seller, patch), fields(seller_id = %seller.id))]
async fn seller_update(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Success<ProductResponse>>, AppError> {
    let product = catalog(&state)
        .update_owned_product(seller.id, product_id, &patch)
        .await?;
    Ok(ok(ProductResponse { product }))
}

#[instrument(skip(state, seller), fields(seller_id = %seller.id))]
async fn seller_delete(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<Success<Message>>, AppError> {
    catalog(&state)
        .delete_owned_product(seller.id, product_id)
        .await?;
    Ok(ok(Message::new("Product deleted")))
}

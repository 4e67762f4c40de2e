//! Domain models for the API.
//!
//! These are the validated shapes handlers and services work with; row
//! types for `PostgreSQL` live next to their queries in `db`. Field names
//! serialize in camelCase with `_id` identifiers, which is the shape
//! existing storefront clients read.

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::{Address, NewOrder, Order, OrderItem, ReviewableItem, SellerOrder};
pub use product::{
    MAX_IMAGES, NewProduct, NewReview, Product, ProductAttributes, ProductPatch, Review,
};
pub use session::{CurrentAdmin, CurrentUser};
pub use user::{NewUser, PayoutDetailsUpdate, User};

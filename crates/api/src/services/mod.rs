//! Business logic services for the API.
//!
//! # Services
//!
//! - `auth` - Registration, email verification, buyer and operator login
//! - `account` - Profiles, payout details and operator account management
//! - `catalog` - Listings, ownership checks and the on-sale rule
//! - `cart` - Sparse per-user carts
//! - `orders` - Placement, payment reconciliation and status changes
//! - `reviews` - Review-token redemption
//!
//! # Collaborators
//!
//! - `tokens` - Signed session tokens and random one-time tokens
//! - `email` - Verification mail over SMTP
//! - `images` - Product image hosting
//! - `payments` - Stripe checkout sessions and Razorpay orders
//!
//! Services borrow their stores and collaborators for the length of one
//! request; handlers build them from `AppState`.

pub mod account;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod email;
pub mod images;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod tokens;

pub use account::AccountService;
pub use auth::{AuthError, AuthService, Registration};
pub use cart::{CartService, CartSummary};
pub use catalog::CatalogService;
pub use orders::{OrderLineRequest, OrderRequest, OrderService};
pub use reviews::ReviewService;

//! Core types for Merkato.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod money;
pub mod rating;
pub mod status;

pub use cart::{Cart, CartError};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{
    AmountOutOfRange, Currency, MAX_AMOUNT, checked_sum, is_storable_amount, line_total,
    sale_price, to_minor_units,
};
pub use rating::{Rating, RatingError, RatingSummary};
pub use status::*;

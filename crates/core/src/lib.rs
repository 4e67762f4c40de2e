//! Merkato Core - Shared domain types.
//!
//! This crate provides the types shared by every Merkato component:
//! - `api` - REST backend for the storefront, seller dashboard and admin panel
//! - `cli` - Command-line tools for migrations and account management
//!
//! # Architecture
//!
//! The core crate contains only types and pure domain rules - no I/O, no
//! database access, no HTTP clients. Rules that must hold regardless of the
//! storage backend (the on-sale price invariant, cart sparsity, rating
//! aggregation, order status transitions) live here so both store
//! implementations share one definition.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, money, statuses, carts and ratings

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

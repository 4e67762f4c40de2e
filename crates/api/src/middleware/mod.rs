//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. CORS
//! 4. Request ID (add unique ID to each request)
//! 5. Rate limiting on credential routes (governor)
//!
//! Authentication is not a layer: handlers take [`RequireUser`],
//! [`RequireSeller`] or [`RequireAdmin`] as extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{RequireAdmin, RequireSeller, RequireUser};
pub use rate_limit::credentials_rate_limiter;
pub use request_id::request_id_middleware;

//! Request ID middleware for request tracing and correlation.
//!
//! The storefront and dashboards may send their own `x-request-id`; it is
//! kept when it looks like an id, otherwise a UUID v4 is minted. The id is
//! recorded on the `http_request` span, tagged on the Sentry scope and echoed
//! in the response so clients can quote it in bug reports.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied id that is passed through.
const MAX_REQUEST_ID_LEN: usize = 64;

/// A client id is kept only if it is short and made of `[A-Za-z0-9._-]`.
fn accept_client_id(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let valid = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    valid.then_some(raw)
}

/// Middleware that ensures every request carries a request ID.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(accept_client_id)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", request_id.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", &request_id));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_ids() {
        assert_eq!(accept_client_id(" web-42.a_b "), Some("web-42.a_b"));
        assert_eq!(
            accept_client_id("0b6f3c2e-8d1a-4f5e-9c7b-2a1d3e4f5a6b"),
            Some("0b6f3c2e-8d1a-4f5e-9c7b-2a1d3e4f5a6b")
        );
    }

    #[test]
    fn test_rejects_odd_ids() {
        assert_eq!(accept_client_id(""), None);
        assert_eq!(accept_client_id("has space"), None);
        assert_eq!(accept_client_id("<script>"), None);
        assert_eq!(accept_client_id(&"a".repeat(MAX_REQUEST_ID_LEN + 1)), None);
    }
}

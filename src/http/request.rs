//! Request handling for the gateway surface.
//!
//! # Responsibilities
//! - Name the request ID header shared by the layers and the handlers
//! - Decode the `POST /proxy` body into a [`ProxyRequest`]
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An empty body is an empty request, so it fails on the missing URL like `{}`

use http::HeaderMap;

use crate::relay::{ProxyRequest, RelayError};

/// Request ID header set by `SetRequestIdLayer` and echoed on every response.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The request ID assigned to this request, or `"unknown"` outside the layer stack.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Decode a `POST /proxy` body.
pub fn parse_proxy_request(body: &[u8]) -> Result<ProxyRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProxyRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| RelayError::MalformedRequest(e.to_string()))
}

//! Envelope → HTTP response.
//!
//! # Design Decisions
//! - Delivered envelopes keep upstream status line, headers and body bytes
//! - An upstream `x-relay-error` header is dropped so it cannot pose as a gateway error
//! - Hop-by-hop headers and `content-length` are dropped and recomputed by hyper
//! - Gateway errors are `{ "error": ... }` with the [`RELAY_ERROR_HEADER`] marker

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::StatusCode;

use crate::relay::{ErrorBody, Outcome, ResponseEnvelope, StatusLine, RELAY_ERROR_HEADER};

const HOP_BY_HOP: &[&str] = &[
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        match self.outcome {
            Outcome::Failed { kind, message } => {
                let mut response = (kind.status_code(), Json(ErrorBody { error: message })).into_response();
                response.headers_mut().insert(
                    HeaderName::from_static(RELAY_ERROR_HEADER),
                    HeaderValue::from_static(kind.as_str()),
                );
                response
            }
            Outcome::Delivered { body, .. } => {
                let status = self
                    .status
                    .as_ref()
                    .and_then(|s| StatusCode::from_u16(s.code).ok())
                    .unwrap_or(StatusCode::OK);
                let mut response = (status, body).into_response();
                *response.headers_mut() = passthrough_headers(self.headers);
                if let Some(reason) = self.status.as_ref().and_then(StatusLine::reason_phrase) {
                    response.extensions_mut().insert(reason);
                }
                response
            }
        }
    }
}

/// Upstream headers minus the ones that describe the upstream connection and
/// the gateway's own error marker.
pub fn passthrough_headers(mut headers: HeaderMap) -> HeaderMap {
    // `Connection` may name further hop-by-hop headers.
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(CONTENT_LENGTH);
    headers.remove(RELAY_ERROR_HEADER);
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers
}

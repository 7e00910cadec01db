//! Direct relay backend.
//!
//! # Responsibilities
//! - Forward method, enabled headers and body to the target URL
//! - Imply a JSON content type for bodies on POST/PUT/PATCH
//! - Hand back upstream status line, headers and body untouched
//!
//! # Design Decisions
//! - Header names are canonicalised with `http::HeaderName` before any lookup
//! - Non-2xx upstream statuses are results, not errors
//! - Single shot: a mutating request reaches the upstream at most once

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect, Client};
use std::time::Duration;

use crate::config::RelayConfig;
use crate::relay::descriptor::{HttpMethod, RequestDescriptor};
use crate::relay::envelope::{ResponseEnvelope, StatusLine};
use crate::relay::error::{describe, RelayError};

/// Forwards descriptors to their upstream origin.
#[derive(Clone)]
pub struct DirectRelay {
    client: Client,
    budget: Duration,
}

impl DirectRelay {
    /// Build the upstream client from configuration.
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self::with_client(client, config.budget()))
    }

    pub fn with_client(client: Client, budget: Duration) -> Self {
        Self { client, budget }
    }

    /// Send the descriptor upstream and normalize what comes back.
    pub async fn forward(
        &self,
        descriptor: &RequestDescriptor,
        method: HttpMethod,
    ) -> Result<ResponseEnvelope, RelayError> {
        let headers = outbound_headers(descriptor, method)?;

        tracing::debug!(
            method = %method,
            url = %descriptor.target_url,
            headers = headers.len(),
            has_body = descriptor.body.is_some(),
            "Forwarding upstream"
        );

        let mut request = self
            .client
            .request(method.into(), descriptor.target_url.as_str())
            .headers(headers);
        if let Some(body) = &descriptor.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(descriptor, e))?;

        let status = StatusLine::received(response.status(), response.extensions());
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(descriptor, e))?;

        tracing::debug!(
            url = %descriptor.target_url,
            status = status.code,
            bytes = body.len(),
            "Upstream responded"
        );

        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        Ok(ResponseEnvelope::delivered(content_type, body)
            .with_status(status.code, status.text)
            .with_headers(headers))
    }

    fn classify(&self, descriptor: &RequestDescriptor, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout {
                url: descriptor.target_url.clone(),
                budget: self.budget,
            }
        } else {
            RelayError::Upstream(describe(&err))
        }
    }
}

/// Headers to send upstream: enabled rows, canonicalised, plus the implied
/// JSON content type when a body would otherwise go out untyped.
pub fn outbound_headers(
    descriptor: &RequestDescriptor,
    method: HttpMethod,
) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::new();
    for entry in descriptor.transmitted_headers() {
        let key = entry.key.trim();
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| RelayError::InvalidHeader {
            name: key.to_string(),
            reason: e.to_string(),
        })?;
        let value =
            HeaderValue::from_str(entry.value.trim()).map_err(|e| RelayError::InvalidHeader {
                name: key.to_string(),
                reason: e.to_string(),
            })?;
        // Later rows win, matching a plain object keyed by header name.
        headers.insert(name, value);
    }

    if descriptor.body.is_some() && method.carries_body() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    Ok(headers)
}

//! Relay error taxonomy.
//!
//! Every failure a relay attempt can hit is a [`RelayError`]. The gateway turns
//! it into a [`ResponseEnvelope`] at exactly one place, [`RelayError::into_envelope`],
//! so callers never branch on which backend failed.

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::relay::envelope::{ErrorKind, ResponseEnvelope};
use crate::scrape::ScrapeError;

/// Errors produced while validating or executing a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("URL is required.")]
    MissingUrl,

    #[error("Method is required when not in scrape mode.")]
    MissingMethod,

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid JSON in request body.")]
    InvalidJsonBody,

    #[error("Invalid request body: {0}")]
    MalformedRequest(String),

    /// Direct relay exceeded the budget.
    #[error("Request timed out after {}: {url}", budget_label(.budget))]
    Timeout { url: String, budget: Duration },

    /// Scrape relay exceeded the budget.
    #[error("Scraping timed out after {}: {url}", budget_label(.budget))]
    ScrapeTimeout { url: String, budget: Duration },

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Scraping failed: {0}")]
    Scrape(#[from] ScrapeError),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::MissingUrl
            | RelayError::MissingMethod
            | RelayError::UnsupportedMethod(_)
            | RelayError::InvalidHeader { .. }
            | RelayError::InvalidJsonBody
            | RelayError::MalformedRequest(_) => ErrorKind::ValidationError,
            RelayError::Timeout { .. } | RelayError::ScrapeTimeout { .. } => {
                ErrorKind::UpstreamTimeout
            }
            RelayError::Upstream(_) | RelayError::Scrape(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Build the uniform error envelope for this failure.
    pub fn into_envelope(self) -> ResponseEnvelope {
        ResponseEnvelope::failed(self.kind(), self.to_string())
    }
}

/// Human phrasing of a relay budget, e.g. "60 seconds".
pub fn budget_label(budget: &Duration) -> String {
    match (budget.as_secs(), budget.subsec_millis()) {
        (1, 0) => "1 second".to_string(),
        (secs, 0) if secs > 0 => format!("{} seconds", secs),
        _ => format!("{} milliseconds", budget.as_millis()),
    }
}

/// Flatten an error and its sources into one line.
///
/// reqwest and hyper nest the interesting part (e.g. "Connection refused")
/// several sources deep; the top-level message alone is rarely useful.
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Every problem is reported, not
//! just the first one.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("scrape.chrome_path must not be empty")]
    MissingChrome,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }
    if config.relay.budget_ms == 0 {
        errors.push(ValidationError::Zero("relay.budget_ms"));
    }
    if config.relay.connect_timeout_ms == 0 {
        errors.push(ValidationError::Zero("relay.connect_timeout_ms"));
    }
    if config.scrape.chrome_path.trim().is_empty() {
        errors.push(ValidationError::MissingChrome);
    }
    if config.scrape.max_browsers == 0 {
        errors.push(ValidationError::Zero("scrape.max_browsers"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

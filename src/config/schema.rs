//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the relay gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Relay budget and upstream client settings.
    pub relay: RelayConfig,

    /// Headless browser settings for scrape mode.
    pub scrape: ScrapeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Maximum accepted size of a `/proxy` request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Relay configuration shared by both backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Time budget for one relay, from dispatch to backend completion.
    pub budget_ms: u64,

    /// TCP connect timeout for direct relays.
    pub connect_timeout_ms: u64,

    /// Maximum number of redirects followed by direct relays.
    pub max_redirects: usize,
}

impl RelayConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            budget_ms: 60_000,
            connect_timeout_ms: 10_000,
            max_redirects: 10,
        }
    }
}

/// Headless browser configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Chrome/Chromium executable (name on PATH or absolute path).
    pub chrome_path: String,

    /// Extra command line switches appended to the default headless set.
    pub extra_args: Vec<String>,

    /// Maximum number of browser processes open at the same time.
    pub max_browsers: usize,

    /// How long the network must stay quiet before the page counts as rendered.
    pub idle_window_ms: u64,

    /// Requests allowed in flight while still counting as quiet.
    pub idle_max_inflight: usize,

    /// Time granted to `Browser.close` before the process is killed.
    pub close_grace_ms: u64,
}

impl ScrapeConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            chrome_path: "chromium".to_string(),
            extra_args: Vec::new(),
            max_browsers: 4,
            idle_window_ms: 500,
            idle_max_inflight: 2,
            close_grace_ms: 2_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Named request presets.
//!
//! The preset store itself lives outside this crate; this is the record it
//! persists. `headers` is the JSON text of the header rows so disabled rows
//! and descriptions survive a save/load cycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::{HeaderEntry, HttpMethod, RelayError, RelayMode, RequestDescriptor};

/// Stored in `method` for scrape-mode presets.
pub const SCRAPE_METHOD: &str = "SCRAPE";

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("a preset needs a name and a URL")]
    Incomplete,

    #[error("invalid preset headers: {0}")]
    Headers(#[from] serde_json::Error),

    #[error(transparent)]
    Method(#[from] RelayError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPreset {
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: String,
    pub body: String,
}

impl RequestPreset {
    /// Snapshot `descriptor` under `name`.
    pub fn capture(name: &str, descriptor: &RequestDescriptor) -> Result<Self, PresetError> {
        let name = name.trim();
        if name.is_empty() || descriptor.target_url.trim().is_empty() {
            return Err(PresetError::Incomplete);
        }

        let method = match (descriptor.mode, descriptor.method) {
            (RelayMode::Scrape, _) => SCRAPE_METHOD.to_string(),
            (RelayMode::Direct, Some(method)) => method.as_str().to_string(),
            (RelayMode::Direct, None) => String::new(),
        };

        Ok(Self {
            name: name.to_string(),
            url: descriptor.target_url.clone(),
            method,
            headers: serde_json::to_string(&descriptor.headers)?,
            body: descriptor.body.clone().unwrap_or_default(),
        })
    }

    /// Rebuild the descriptor this preset was captured from.
    ///
    /// Scrape presets come back without a method; the form falls back to its
    /// own default when switching to direct mode.
    pub fn restore(&self) -> Result<RequestDescriptor, PresetError> {
        let (mode, method) = match self.method.trim() {
            m if m.eq_ignore_ascii_case(SCRAPE_METHOD) => (RelayMode::Scrape, None),
            "" => (RelayMode::Direct, None),
            m => (RelayMode::Direct, Some(m.parse::<HttpMethod>()?)),
        };

        let headers: Vec<HeaderEntry> = if self.headers.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.headers)?
        };

        Ok(RequestDescriptor {
            target_url: self.url.clone(),
            mode,
            method,
            headers,
            body: Some(self.body.clone()).filter(|b| !b.is_empty()),
        })
    }
}

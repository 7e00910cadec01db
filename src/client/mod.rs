//! Client side of the relay.
//!
//! # Data Flow
//! ```text
//! DescriptorBuilder → RequestDescriptor
//!     → RequestExecutor::submit (token, timing starts)
//!         → POST <gateway>/proxy
//!         → ResponseEnvelope::from_gateway
//!     → commit if still current → visible()
//! RequestExecutor::cancel(token) → Cancelled envelope, committed at once
//! ```

pub mod executor;
pub mod preset;

pub use executor::{CancelToken, ExecutorError, PendingRequest, RequestExecutor};
pub use preset::{PresetError, RequestPreset, SCRAPE_METHOD};

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway / scrape renderer
//!     → logging.rs (tracing subscriber, level from config or RUST_LOG)
//!     → metrics.rs (relay counters and latency, open browsers)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the HTTP trace span
//! - Metric calls go through the `metrics` facade and are no-ops until a
//!   recorder is installed

pub mod logging;
pub mod metrics;

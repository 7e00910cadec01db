//! Request-relay subsystem.
//!
//! # Data Flow
//! ```text
//! POST /proxy body
//!     → descriptor.rs (ProxyRequest → RequestDescriptor, validation)
//!     → gateway.rs (dispatch by mode, relay budget)
//!         → direct.rs (forward upstream)        mode = Direct
//!         → scrape (headless render)            mode = Scrape
//!     → envelope.rs (normalize into ResponseEnvelope)
//!     → http/response.rs (envelope → HTTP response)
//! ```
//!
//! # Design Decisions
//! - Validation happens before any network activity
//! - One budget for both backends, measured from dispatch
//! - No retries: one relay, at most one upstream side effect

pub mod descriptor;
pub mod direct;
pub mod envelope;
pub mod error;
pub mod gateway;

pub use descriptor::{
    DescriptorBuilder, HeaderEntry, HttpMethod, ProxyRequest, RelayMode, RequestDescriptor,
};
pub use direct::DirectRelay;
pub use envelope::{
    ContentCategory, ErrorBody, ErrorKind, Outcome, Payload, ResponseEnvelope, StatusLine,
    RELAY_ERROR_HEADER,
};
pub use error::RelayError;
pub use gateway::ProxyGateway;

//! HTTP request relay.
//!
//! A client-side [`client::RequestExecutor`] sends request descriptors to a
//! gateway (`POST /proxy`) that either forwards them to the target origin or
//! renders the target page in a throw-away headless browser.

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod scrape;

pub use self::config::GatewayConfig;
pub use self::http::HttpServer;
pub use self::lifecycle::Shutdown;
pub use self::relay::{ProxyGateway, RequestDescriptor, ResponseEnvelope};

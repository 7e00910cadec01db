//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router (`POST /proxy`, `GET /health`)
//! - Wire up middleware (request ID, tracing, CORS, body limit)
//! - Bind server to listener and stop on the shutdown signal
//! - Hand each relay to the [`ProxyGateway`]

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use http::HeaderMap;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{parse_proxy_request, request_id};
use crate::relay::{ProxyGateway, ProxyRequest};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ProxyGateway>,
}

/// HTTP server for the relay gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server with a gateway built from the configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let gateway = Arc::new(ProxyGateway::from_config(&config)?);
        Ok(Self::with_gateway(config, gateway))
    }

    /// Create a server around an existing gateway.
    pub fn with_gateway(config: GatewayConfig, gateway: Arc<ProxyGateway>) -> Self {
        let router = Self::build_router(&config, AppState { gateway });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CorsLayer::permissive());

        Router::new()
            .route("/proxy", post(proxy_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(middleware)
    }

    /// The router, for serving on a listener of the caller's choosing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            budget_ms = self.config.relay.budget_ms,
            max_browsers = self.config.scrape.max_browsers,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `POST /proxy`: decode, validate, relay.
async fn proxy_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let descriptor = parse_proxy_request(&body).and_then(ProxyRequest::into_descriptor);

    match descriptor {
        Ok(descriptor) => state.gateway.relay(&descriptor).await.into_response(),
        Err(err) => {
            tracing::warn!(
                request_id = %request_id(&headers),
                error = %err,
                "Rejected relay request"
            );
            err.into_envelope().into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

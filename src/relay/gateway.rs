//! Gateway dispatch.
//!
//! Validates a descriptor, picks the backend for its mode and holds it to the
//! relay budget. Mode is the only thing dispatch looks at. The scrape backend
//! takes the budget itself so that closing a browser happens outside it.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::relay::descriptor::{RelayMode, RequestDescriptor};
use crate::relay::direct::DirectRelay;
use crate::relay::envelope::ResponseEnvelope;
use crate::relay::error::RelayError;
use crate::scrape::{ChromeLauncher, ScrapeError, ScrapeRenderer};

/// Single entry point for relays. Calls share nothing but the browser slots.
pub struct ProxyGateway {
    direct: DirectRelay,
    scrape: ScrapeRenderer,
    budget: Duration,
}

impl ProxyGateway {
    pub fn new(direct: DirectRelay, scrape: ScrapeRenderer, budget: Duration) -> Self {
        Self {
            direct,
            scrape,
            budget,
        }
    }

    /// Gateway backed by reqwest and a local Chrome.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let direct = DirectRelay::new(&config.relay)?;
        let launcher = Arc::new(ChromeLauncher::new(&config.scrape));
        let scrape = ScrapeRenderer::new(launcher, &config.scrape);
        Ok(Self::new(direct, scrape, config.relay.budget()))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Relay one descriptor. Always settles into an envelope.
    pub async fn relay(&self, descriptor: &RequestDescriptor) -> ResponseEnvelope {
        let started = Instant::now();
        let result = self.dispatch(descriptor).await;
        let elapsed = started.elapsed();
        let mode = descriptor.mode.as_str();

        match result {
            Ok(envelope) => {
                metrics::record_relay(mode, "delivered", elapsed);
                tracing::info!(
                    mode,
                    url = %descriptor.target_url,
                    status = ?envelope.status_code(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Relay completed"
                );
                envelope.with_elapsed(elapsed)
            }
            Err(err) => {
                let kind = err.kind();
                metrics::record_relay(mode, kind.as_str(), elapsed);
                tracing::warn!(
                    mode,
                    url = %descriptor.target_url,
                    kind = %kind,
                    error = %err,
                    "Relay failed"
                );
                err.into_envelope().with_elapsed(elapsed)
            }
        }
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<ResponseEnvelope, RelayError> {
        let method = descriptor.validate()?;
        let url = descriptor.target_url.trim();

        match (descriptor.mode, method) {
            (RelayMode::Scrape, _) => {
                self.scrape
                    .render(url, self.budget)
                    .await
                    .map_err(|err| match err {
                        ScrapeError::TimedOut => RelayError::ScrapeTimeout {
                            url: url.to_string(),
                            budget: self.budget,
                        },
                        other => RelayError::from(other),
                    })
            }
            (RelayMode::Direct, Some(method)) => {
                timeout(self.budget, self.direct.forward(descriptor, method))
                    .await
                    .map_err(|_| RelayError::Timeout {
                        url: url.to_string(),
                        budget: self.budget,
                    })?
            }
            (RelayMode::Direct, None) => Err(RelayError::MissingMethod),
        }
    }
}

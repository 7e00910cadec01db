//! Headless rendering subsystem (scrape mode).
//!
//! # Data Flow
//! ```text
//! ScrapeRenderer::render(url, budget)
//!     → acquire browser slot (process-wide semaphore)
//!     → BrowserLauncher::launch (fresh browser, own profile)
//!     → BrowserGuard (owns session + slot)
//!         → session.render: navigate, wait for network idle, read markup
//!     → guard.release (orderly close), or guard drop (kill) on any other exit
//! ```
//!
//! # Design Decisions
//! - No pooling: one browser per call, torn down before the call returns
//! - Release is tied to ownership, not to control flow
//! - The budget ends when the render settles; closing a browser afterwards
//!   cannot turn a rendered page into a timeout

pub mod cdp;
pub mod chrome;
pub mod idle;
pub mod launcher;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use crate::config::ScrapeConfig;
use crate::relay::envelope::ResponseEnvelope;

pub use chrome::ChromeLauncher;
pub use idle::{IdlePolicy, NetworkIdle};
pub use launcher::{BrowserGuard, BrowserLauncher, BrowserSession};

/// Errors raised while rendering a page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("browser exited before exposing a DevTools endpoint")]
    NoEndpoint,

    #[error("DevTools connection failed: {0}")]
    Connection(String),

    #[error("{method} failed: {message}")]
    Protocol { method: String, message: String },

    #[error("{reason} at {url}")]
    Navigation { url: String, reason: String },

    #[error("Page crashed!")]
    Crashed,

    #[error("browser disconnected")]
    Disconnected,

    #[error("render budget exhausted")]
    TimedOut,

    #[error("unexpected DevTools response to {0}")]
    UnexpectedResponse(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Renders pages in throw-away browser sessions.
#[derive(Clone)]
pub struct ScrapeRenderer {
    launcher: Arc<dyn BrowserLauncher>,
    slots: Arc<Semaphore>,
    policy: IdlePolicy,
}

impl ScrapeRenderer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &ScrapeConfig) -> Self {
        Self {
            launcher,
            slots: Arc::new(Semaphore::new(config.max_browsers)),
            policy: IdlePolicy::from(config),
        }
    }

    /// Browsers that could still be opened right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Render `url` and return its markup as a `text/html` envelope.
    ///
    /// `budget` covers waiting for a slot, launching and rendering. When it
    /// runs out the browser is killed and [`ScrapeError::TimedOut`] returned.
    pub async fn render(&self, url: &str, budget: Duration) -> Result<ResponseEnvelope, ScrapeError> {
        let deadline = Instant::now() + budget;
        let mut guard = timeout_at(deadline, self.open())
            .await
            .map_err(|_| ScrapeError::TimedOut)??;
        tracing::debug!(url, slots_left = self.available_slots(), "Browser session opened");

        let rendered = match timeout_at(deadline, guard.render(url, &self.policy)).await {
            Ok(rendered) => rendered,
            // Dropping the guard kills the browser.
            Err(_) => return Err(ScrapeError::TimedOut),
        };
        guard.release().await;

        let html = rendered?;
        tracing::debug!(url, bytes = html.len(), "Page rendered");
        Ok(ResponseEnvelope::markup(html))
    }

    async fn open(&self) -> Result<BrowserGuard, ScrapeError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScrapeError::Launch("browser slots closed".into()))?;
        let session = self.launcher.launch().await?;
        Ok(BrowserGuard::new(session, permit))
    }
}

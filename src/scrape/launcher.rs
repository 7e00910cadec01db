//! Browser launching and scoped release.

use async_trait::async_trait;
use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics;
use crate::scrape::idle::IdlePolicy;
use crate::scrape::ScrapeError;

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

/// One running browser with a single page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url`, wait until the network is idle, return the markup.
    async fn render(&mut self, url: &str, policy: &IdlePolicy) -> Result<String, ScrapeError>;

    /// Orderly shutdown.
    async fn close(self: Box<Self>);

    /// Immediate teardown. Must not block; called from `Drop`.
    fn kill(&mut self);
}

/// Owns a browser session and its slot for the duration of one render.
///
/// [`BrowserGuard::release`] closes the browser politely. Any other way out
/// (error, relay timeout dropping the future, panic) goes through `Drop`,
/// which kills it.
pub struct BrowserGuard {
    session: Option<Box<dyn BrowserSession>>,
    _permit: OwnedSemaphorePermit,
}

impl BrowserGuard {
    pub fn new(session: Box<dyn BrowserSession>, permit: OwnedSemaphorePermit) -> Self {
        metrics::browser_opened();
        Self {
            session: Some(session),
            _permit: permit,
        }
    }

    pub async fn render(&mut self, url: &str, policy: &IdlePolicy) -> Result<String, ScrapeError> {
        match self.session.as_mut() {
            Some(session) => session.render(url, policy).await,
            None => Err(ScrapeError::Disconnected),
        }
    }

    /// Close the browser, then give the slot back.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for BrowserGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::warn!("Browser session dropped before release, killing it");
            session.kill();
        }
        metrics::browser_closed();
    }
}

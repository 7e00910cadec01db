//! Client-side request lifecycle: submit → (cancel) → settle.
//!
//! One attempt is current at a time. Every attempt gets a [`CancelToken`];
//! a settled result is committed to the visible state only while its token is
//! still the current one, so a superseded or cancelled attempt can never
//! overwrite what the user sees.

use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::relay::error::describe;
use crate::relay::{ErrorKind, RelayMode, RequestDescriptor, ResponseEnvelope, StatusLine};

pub const CANCELLED_MESSAGE: &str = "Request cancelled by user.";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid gateway URL: {0}")]
    InvalidGateway(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Identity of one submitted attempt.
///
/// Tokens compare by attempt id, so a token kept from an earlier submission
/// never matches a newer one.
#[derive(Debug, Clone)]
pub struct CancelToken {
    id: u64,
    signal: CancellationToken,
    started: Instant,
}

impl CancelToken {
    fn new(id: u64) -> Self {
        Self {
            id,
            signal: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CancelToken {}

/// Handle on a submitted attempt.
pub struct PendingRequest {
    token: CancelToken,
    handle: JoinHandle<ResponseEnvelope>,
}

impl PendingRequest {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// This attempt's own envelope, whether or not it reached the visible state.
    pub async fn settled(self) -> ResponseEnvelope {
        match self.handle.await {
            Ok(envelope) => envelope,
            Err(e) => ResponseEnvelope::failed(ErrorKind::UpstreamFailure, format!("Request failed: {e}"))
                .with_elapsed(self.token.elapsed()),
        }
    }
}

#[derive(Default)]
struct Slot {
    current: Option<CancelToken>,
    visible: Option<ResponseEnvelope>,
    next_id: u64,
}

impl Slot {
    /// Commit `envelope` if `token` is still current. Settling clears `current`.
    fn commit(&mut self, token: &CancelToken, envelope: &ResponseEnvelope) -> bool {
        if self.current.as_ref() != Some(token) {
            return false;
        }
        self.current = None;
        self.visible = Some(envelope.clone());
        true
    }
}

/// Submits descriptors to a relay gateway and owns the visible result.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    endpoint: Url,
    slot: Arc<Mutex<Slot>>,
}

impl RequestExecutor {
    /// Executor for the gateway at `gateway` (base URL, or the full `/proxy` URL).
    pub fn new(gateway: &str) -> Result<Self, ExecutorError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(client, proxy_endpoint(gateway)?))
    }

    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Resolved `/proxy` endpoint of the gateway.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Start a new attempt, superseding the current one if any.
    pub fn submit(&self, descriptor: RequestDescriptor) -> PendingRequest {
        let token = {
            let mut slot = self.lock();
            slot.next_id += 1;
            let token = CancelToken::new(slot.next_id);
            if let Some(previous) = slot.current.replace(token.clone()) {
                tracing::debug!(superseded = previous.id, by = token.id, "Superseding pending request");
                previous.signal.cancel();
            }
            token
        };

        tracing::debug!(
            attempt = token.id,
            mode = descriptor.mode.as_str(),
            url = %descriptor.target_url,
            "Submitting request"
        );

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let slot = self.slot.clone();
        let attempt = token.clone();
        let handle = tokio::spawn(async move {
            let envelope = tokio::select! {
                biased;
                _ = attempt.signal.cancelled() => {
                    ResponseEnvelope::failed(ErrorKind::Cancelled, CANCELLED_MESSAGE)
                }
                envelope = transport(&client, endpoint, &descriptor) => envelope,
            };
            let envelope = envelope.with_elapsed(attempt.elapsed());

            let committed = lock(&slot).commit(&attempt, &envelope);
            if !committed {
                tracing::debug!(attempt = attempt.id, "Discarding result of stale attempt");
            }
            envelope
        });

        PendingRequest { token, handle }
    }

    /// Cancel the attempt behind `token`.
    ///
    /// Commits and returns the cancellation envelope right away. A token that
    /// is not current (stale, or already settled) changes nothing.
    pub fn cancel(&self, token: &CancelToken) -> Option<ResponseEnvelope> {
        let mut slot = self.lock();
        if slot.current.as_ref() != Some(token) {
            tracing::debug!(attempt = token.id, "Ignoring cancel for a request that is not current");
            return None;
        }

        token.signal.cancel();
        let envelope = ResponseEnvelope::failed(ErrorKind::Cancelled, CANCELLED_MESSAGE).with_elapsed(token.elapsed());
        slot.commit(token, &envelope);
        tracing::info!(attempt = token.id, elapsed_ms = envelope.elapsed_ms, "Request cancelled");
        Some(envelope)
    }

    /// The latest committed envelope.
    pub fn visible(&self) -> Option<ResponseEnvelope> {
        self.lock().visible.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().current.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock(&self.slot)
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `http://host:5000` and `http://host:5000/proxy` both name the same endpoint.
pub fn proxy_endpoint(gateway: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(gateway.trim())?;
    if !url.path().trim_end_matches('/').ends_with("/proxy") {
        let path = format!("{}/proxy", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    Ok(url)
}

async fn transport(client: &Client, endpoint: Url, descriptor: &RequestDescriptor) -> ResponseEnvelope {
    let wire = match descriptor.to_wire() {
        Ok(wire) => wire,
        Err(err) => return err.into_envelope(),
    };

    let response = match client.post(endpoint).json(&wire).send().await {
        Ok(response) => response,
        Err(err) => return transport_failure(&err),
    };
    let status = StatusLine::received(response.status(), response.extensions());
    let headers = response.headers().clone();
    match response.bytes().await {
        Ok(body) => {
            let mut envelope = ResponseEnvelope::from_gateway(status, headers, body);
            // A rendered page has no single upstream status.
            if descriptor.mode == RelayMode::Scrape {
                envelope.status = None;
            }
            envelope
        }
        Err(err) => transport_failure(&err),
    }
}

fn transport_failure(err: &reqwest::Error) -> ResponseEnvelope {
    ResponseEnvelope::failed(ErrorKind::UpstreamFailure, format!("Request failed: {}", describe(err)))
}

//! Minimal Chrome DevTools Protocol client.
//!
//! One WebSocket to the browser endpoint. Commands are matched to replies by
//! id; everything without an id is an event and goes to a single consumer.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::scrape::ScrapeError;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ScrapeError>>>>>;

/// A DevTools event, tagged with the session that emitted it.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Incoming {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<ProtocolError>,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtocolError {
    message: String,
}

/// Command side of a DevTools connection.
pub struct CdpConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a browser endpoint (`ws://127.0.0.1:<port>/devtools/browser/<id>`).
    ///
    /// Returns the connection and the receiver for all events.
    pub async fn connect(
        endpoint: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CdpEvent>), ScrapeError> {
        let (socket, _) = connect_async(endpoint)
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        dispatch(text.as_str(), &reader_pending, &events_tx);
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Dropping the senders fails every call still waiting.
            if let Ok(mut pending) = reader_pending.lock() {
                pending.clear();
            }
        });

        Ok((
            Self {
                outgoing,
                pending,
                next_id: AtomicU64::new(1),
                reader,
                writer,
            },
            events_rx,
        ))
    }

    /// Send a command and wait for its reply.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, ScrapeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| ScrapeError::Disconnected)?
            .insert(id, tx);

        let mut command = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            command["sessionId"] = Value::String(session_id.to_string());
        }
        tracing::trace!(id, method, "DevTools command");

        if self.outgoing.send(Message::text(command.to_string())).is_err() {
            self.forget(id);
            return Err(ScrapeError::Disconnected);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(ScrapeError::Protocol { message, .. })) => Err(ScrapeError::Protocol {
                method: method.to_string(),
                message,
            }),
            Ok(Err(other)) => Err(other),
            Err(_) => Err(ScrapeError::Disconnected),
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn dispatch(text: &str, pending: &Pending, events: &mpsc::UnboundedSender<CdpEvent>) {
    let incoming: Incoming = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed DevTools message");
            return;
        }
    };

    if let Some(id) = incoming.id {
        let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
        if let Some(waiter) = waiter {
            let reply = match incoming.error {
                Some(error) => Err(ScrapeError::Protocol {
                    method: String::new(),
                    message: error.message,
                }),
                None => Ok(incoming.result.unwrap_or(Value::Null)),
            };
            let _ = waiter.send(reply);
        }
    } else if let Some(method) = incoming.method {
        let _ = events.send(CdpEvent {
            method,
            params: incoming.params,
            session_id: incoming.session_id,
        });
    }
}

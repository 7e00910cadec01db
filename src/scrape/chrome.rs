//! Local Chrome/Chromium sessions.
//!
//! Each launch starts a new headless process with its own temporary profile
//! and `--remote-debugging-port=0`; the DevTools endpoint is read from the
//! process's stderr.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use uuid::Uuid;

use crate::config::ScrapeConfig;
use crate::scrape::cdp::{CdpConnection, CdpEvent};
use crate::scrape::idle::{IdlePolicy, NetworkIdle};
use crate::scrape::launcher::{BrowserLauncher, BrowserSession};
use crate::scrape::ScrapeError;

const HEADLESS_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-extensions",
    "--mute-audio",
    "--remote-debugging-port=0",
];

/// Serializes the document the way a browser "view source" of the live DOM would.
const CONTENT_SCRIPT: &str = "(() => { \
    let html = ''; \
    if (document.doctype) html = new XMLSerializer().serializeToString(document.doctype); \
    if (document.documentElement) html += document.documentElement.outerHTML; \
    return html; \
})()";

/// Launches a fresh Chrome process per session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    chrome_path: String,
    extra_args: Vec<String>,
    close_grace: Duration,
}

impl ChromeLauncher {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            extra_args: config.extra_args.clone(),
            close_grace: config.close_grace(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let profile = ProfileDir(std::env::temp_dir().join(format!("http-relay-{}", Uuid::new_v4())));

        let mut child = Command::new(&self.chrome_path)
            .args(HEADLESS_ARGS)
            .arg(format!("--user-data-dir={}", profile.0.display()))
            .args(&self.extra_args)
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScrapeError::Launch(format!("{}: {}", self.chrome_path, e)))?;

        let stderr = child.stderr.take().ok_or(ScrapeError::NoEndpoint)?;
        let mut lines = BufReader::new(stderr).lines();
        let endpoint = loop {
            match lines.next_line().await? {
                Some(line) => {
                    if let Some(endpoint) = devtools_endpoint(&line) {
                        break endpoint.to_string();
                    }
                }
                None => return Err(ScrapeError::NoEndpoint),
            }
        };
        // Keep draining so a chatty browser never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "chrome", "{}", line);
            }
        });

        tracing::debug!(pid = ?child.id(), endpoint = %endpoint, "Chrome started");
        let (cdp, events) = CdpConnection::connect(&endpoint).await?;

        Ok(Box::new(ChromeSession {
            cdp,
            events,
            child,
            close_grace: self.close_grace,
            _profile: profile,
        }))
    }
}

/// Extract the WebSocket URL from Chrome's startup banner.
pub fn devtools_endpoint(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("DevTools listening on ")
        .map(str::trim)
        .filter(|url| url.starts_with("ws://"))
}

/// Temporary profile directory, removed on drop.
struct ProfileDir(PathBuf);

impl Drop for ProfileDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

struct ChromeSession {
    cdp: CdpConnection,
    events: mpsc::UnboundedReceiver<CdpEvent>,
    child: Child,
    close_grace: Duration,
    // Declared last so it is removed after the process is gone.
    _profile: ProfileDir,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn render(&mut self, url: &str, policy: &IdlePolicy) -> Result<String, ScrapeError> {
        let target = self
            .cdp
            .call(None, "Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = target["targetId"]
            .as_str()
            .ok_or(ScrapeError::UnexpectedResponse("Target.createTarget"))?;

        let attached = self
            .cdp
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached["sessionId"]
            .as_str()
            .ok_or(ScrapeError::UnexpectedResponse("Target.attachToTarget"))?
            .to_string();
        let session = Some(session.as_str());

        self.cdp.call(session, "Page.enable", json!({})).await?;
        self.cdp.call(session, "Network.enable", json!({})).await?;

        let navigation = self
            .cdp
            .call(session, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(reason) = navigation["errorText"].as_str().filter(|s| !s.is_empty()) {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }

        wait_for_idle(&mut self.events, session, policy).await?;

        let content = self
            .cdp
            .call(
                session,
                "Runtime.evaluate",
                json!({ "expression": CONTENT_SCRIPT, "returnByValue": true }),
            )
            .await?;
        if let Some(details) = content.get("exceptionDetails") {
            return Err(ScrapeError::Protocol {
                method: "Runtime.evaluate".into(),
                message: details["text"].as_str().unwrap_or("script threw").to_string(),
            });
        }
        content["result"]["value"]
            .as_str()
            .map(str::to_string)
            .ok_or(ScrapeError::UnexpectedResponse("Runtime.evaluate"))
    }

    async fn close(mut self: Box<Self>) {
        let grace = self.close_grace;
        let _ = timeout(grace, self.cdp.call(None, "Browser.close", json!({}))).await;
        if timeout(grace, self.child.wait()).await.is_err() {
            tracing::warn!(pid = ?self.child.id(), "Chrome ignored Browser.close, killing it");
            let _ = self.child.kill().await;
        }
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // No-op when the process already exited.
        self.kill();
    }
}

async fn wait_for_idle(
    events: &mut mpsc::UnboundedReceiver<CdpEvent>,
    session: Option<&str>,
    policy: &IdlePolicy,
) -> Result<(), ScrapeError> {
    let mut idle = NetworkIdle::new(Instant::now());
    // Page.navigate only replies once the navigation has committed.
    idle.commit(Instant::now());
    loop {
        let wake = idle.quiet_at(policy);
        tokio::select! {
            event = events.recv() => {
                let event = event.ok_or(ScrapeError::Disconnected)?;
                if event.session_id.as_deref() != session {
                    continue;
                }
                match event.method.as_str() {
                    "Inspector.targetCrashed" => return Err(ScrapeError::Crashed),
                    method => idle.observe(method, &event.params, Instant::now()),
                }
            }
            _ = wake_at(wake) => {
                if idle.is_quiet(Instant::now(), policy) {
                    tracing::debug!(inflight = idle.inflight(), "Network idle");
                    return Ok(());
                }
            }
        }
    }
}

async fn wake_at(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devtools_endpoint() {
        assert_eq!(
            devtools_endpoint(
                "DevTools listening on ws://127.0.0.1:39421/devtools/browser/3f1c\n"
            ),
            Some("ws://127.0.0.1:39421/devtools/browser/3f1c")
        );
        assert_eq!(devtools_endpoint("[0101/000000.000:ERROR:gpu_init.cc] nope"), None);
        assert_eq!(devtools_endpoint("DevTools listening on http://x"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_launch_error() {
        let mut config = ScrapeConfig::default();
        config.chrome_path = "/nonexistent/chrome-for-tests".into();
        let err = ChromeLauncher::new(&config).launch().await.err().unwrap();
        assert!(matches!(err, ScrapeError::Launch(ref m) if m.contains("/nonexistent/chrome-for-tests")));
    }

    #[tokio::test]
    async fn test_wait_for_idle_ignores_other_sessions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = IdlePolicy {
            max_inflight: 0,
            window: Duration::from_millis(20),
        };
        let event = |method: &str, session: &str| CdpEvent {
            method: method.to_string(),
            params: json!({ "requestId": "r1" }),
            session_id: Some(session.to_string()),
        };
        tx.send(event("Page.loadEventFired", "other")).unwrap();
        tx.send(event("Page.loadEventFired", "mine")).unwrap();
        tx.send(event("Inspector.targetCrashed", "other")).unwrap();

        wait_for_idle(&mut rx, Some("mine"), &policy).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_idle_reports_crash() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(CdpEvent {
            method: "Inspector.targetCrashed".into(),
            params: json!({}),
            session_id: Some("mine".into()),
        })
        .unwrap();

        let err = wait_for_idle(&mut rx, Some("mine"), &IdlePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Crashed));
    }

    #[tokio::test]
    async fn test_wait_for_idle_tolerates_a_hung_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = IdlePolicy {
            max_inflight: 2,
            window: Duration::from_millis(20),
        };
        tx.send(CdpEvent {
            method: "Network.requestWillBeSent".into(),
            params: json!({ "requestId": "never-finishes" }),
            session_id: Some("mine".into()),
        })
        .unwrap();

        timeout(Duration::from_secs(5), wait_for_idle(&mut rx, Some("mine"), &policy))
            .await
            .expect("page never became quiet")
            .unwrap();
        drop(tx);
    }
}

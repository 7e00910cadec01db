//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use http_relay::config::{GatewayConfig, RelayConfig, ScrapeConfig};
use http_relay::lifecycle::Shutdown;
use http_relay::relay::{DirectRelay, ProxyGateway};
use http_relay::scrape::{BrowserLauncher, BrowserSession, IdlePolicy, ScrapeError, ScrapeRenderer};
use http_relay::HttpServer;

/// What a mock upstream received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Names lower-cased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }
}

/// Canned upstream response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status_line: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(status_line: &'static str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_line,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a raw-TCP upstream on an ephemeral port answering every request with `response`.
pub async fn start_upstream(response: MockResponse) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut socket).await {
                    recorded.lock().unwrap().push(request);
                }
                tokio::time::sleep(response.delay).await;

                let mut head = format!("HTTP/1.1 {}\r\n", response.status_line);
                for (name, value) in &response.headers {
                    head.push_str(&format!("{}: {}\r\n", name, value));
                }
                head.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n",
                    response.body.len()
                ));
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&response.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream { addr, requests }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// What a scripted browser does when asked to render.
#[derive(Debug, Clone)]
pub enum Script {
    Html(String),
    /// Never becomes quiet.
    Hang,
    Fail(String),
    Panic,
}

/// In-process stand-in for Chrome that counts open sessions.
pub struct ScriptedLauncher {
    script: Script,
    render_delay: Duration,
    close_delay: Duration,
    stats: Arc<BrowserStats>,
}

#[derive(Debug, Default)]
pub struct BrowserStats {
    pub launched: AtomicUsize,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub closed: AtomicUsize,
    pub killed: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl BrowserStats {
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
    pub fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            render_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            stats: Arc::new(BrowserStats::default()),
        }
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Make an orderly close take `delay`.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<BrowserStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        let open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            render_delay: self.render_delay,
            close_delay: self.close_delay,
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedSession {
    script: Script,
    render_delay: Duration,
    close_delay: Duration,
    stats: Arc<BrowserStats>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn render(&mut self, url: &str, _policy: &IdlePolicy) -> Result<String, ScrapeError> {
        self.stats.urls.lock().unwrap().push(url.to_string());
        tokio::time::sleep(self.render_delay).await;
        match &self.script {
            Script::Html(html) => Ok(html.clone()),
            Script::Hang => std::future::pending().await,
            Script::Fail(reason) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            Script::Panic => panic!("renderer blew up"),
        }
    }

    async fn close(self: Box<Self>) {
        tokio::time::sleep(self.close_delay).await;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn kill(&mut self) {
        self.stats.killed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Gateway with a real direct relay and a scripted browser.
pub fn gateway(launcher: ScriptedLauncher, budget: Duration, max_browsers: usize) -> ProxyGateway {
    let relay = RelayConfig {
        budget_ms: budget.as_millis() as u64,
        ..RelayConfig::default()
    };
    let scrape = ScrapeConfig {
        max_browsers,
        ..ScrapeConfig::default()
    };
    let direct = DirectRelay::new(&relay).unwrap();
    let renderer = ScrapeRenderer::new(Arc::new(launcher), &scrape);
    ProxyGateway::new(direct, renderer, budget)
}

/// Serve `gateway` on an ephemeral port. Returns the base URL.
pub async fn start_gateway(gateway: ProxyGateway) -> (String, Shutdown) {
    start_gateway_with(GatewayConfig::default(), gateway).await
}

pub async fn start_gateway_with(config: GatewayConfig, gateway: ProxyGateway) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_gateway(config, Arc::new(gateway));
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });
    (format!("http://{}", addr), shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

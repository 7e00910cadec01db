//! Response envelopes and normalization.
//!
//! Both sides of the relay settle every attempt into a [`ResponseEnvelope`]:
//! the gateway when a backend finishes, the executor when the gateway answers.
//! The payload shape is chosen from the content type here and nowhere else.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Extensions, HeaderMap, HeaderValue, StatusCode};
use hyper::ext::ReasonPhrase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Marks gateway-originated errors so clients can tell them from upstream ones.
pub const RELAY_ERROR_HEADER: &str = "x-relay-error";

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Failure classes shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    UpstreamTimeout,
    UpstreamFailure,
    /// Client-local; the gateway never reports it.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamFailure => "upstream_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "validation_error" => Ok(ErrorKind::ValidationError),
            "upstream_timeout" => Ok(ErrorKind::UpstreamTimeout),
            "upstream_failure" => Ok(ErrorKind::UpstreamFailure),
            "cancelled" => Ok(ErrorKind::Cancelled),
            _ => Err(()),
        }
    }
}

/// `{ "error": "..." }` body of gateway error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Presentation category derived from a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    Structured,
    Markup,
    PlainText,
}

impl ContentCategory {
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => ContentCategory::Structured,
            "text/html" => ContentCategory::Markup,
            _ => ContentCategory::PlainText,
        }
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Value),
}

impl Payload {
    /// Decode `body` the way its content type says. JSON that fails to parse
    /// stays text.
    pub fn decode(category: ContentCategory, body: &[u8]) -> Self {
        if category == ContentCategory::Structured {
            if let Ok(value) = serde_json::from_slice(body) {
                return Payload::Structured(value);
            }
        }
        Payload::Text(String::from_utf8_lossy(body).into_owned())
    }

    /// Text for display: pretty JSON for structured payloads.
    pub fn render(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Upstream status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub text: String,
}

impl StatusLine {
    /// Status line as received. hyper only records a [`ReasonPhrase`] when the
    /// peer sent something other than the standard phrase for the code.
    pub fn received(status: StatusCode, extensions: &Extensions) -> Self {
        let text = extensions
            .get::<ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
        Self {
            code: status.as_u16(),
            text,
        }
    }

    /// Reason phrase to put on the wire, `None` when hyper's default matches.
    pub fn reason_phrase(&self) -> Option<ReasonPhrase> {
        let canonical = StatusCode::from_u16(self.code)
            .ok()
            .and_then(|status| status.canonical_reason());
        if self.text.is_empty() || canonical == Some(self.text.as_str()) {
            return None;
        }
        ReasonPhrase::try_from(self.text.as_bytes()).ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `body` holds the exact bytes received; `payload` is their decoded form.
    Delivered { payload: Payload, body: Bytes },
    Failed { kind: ErrorKind, message: String },
}

/// Settled result of one relay attempt.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub outcome: Outcome,
    pub content_type: String,
    pub status: Option<StatusLine>,
    pub headers: HeaderMap,
    pub elapsed_ms: u64,
    pub byte_size: u64,
}

impl ResponseEnvelope {
    /// Normalize a successful body.
    pub fn delivered(content_type: Option<&str>, body: Bytes) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let payload = Payload::decode(ContentCategory::from_content_type(&content_type), &body);
        Self {
            outcome: Outcome::Delivered { payload, body },
            content_type,
            status: None,
            headers: HeaderMap::new(),
            elapsed_ms: 0,
            byte_size: 0,
        }
    }

    /// Rendered page markup. There is no upstream status to report.
    pub fn markup(html: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Self {
            outcome: Outcome::Delivered {
                body: Bytes::from(html.clone()),
                payload: Payload::Text(html),
            },
            content_type: "text/html".to_string(),
            status: None,
            headers,
            elapsed_ms: 0,
            byte_size: 0,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed {
                kind,
                message: message.into(),
            },
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            status: None,
            headers: HeaderMap::new(),
            elapsed_ms: 0,
            byte_size: 0,
        }
    }

    /// Normalize a gateway response on the client side.
    ///
    /// Responses marked with [`RELAY_ERROR_HEADER`] become error envelopes;
    /// everything else, non-2xx included, is a delivered upstream response.
    pub fn from_gateway(status: StatusLine, headers: HeaderMap, body: Bytes) -> Self {
        let relay_error = headers
            .get(RELAY_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<ErrorKind>().ok());
        if let Some(kind) = relay_error {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Self::failed(kind, message);
        }

        let mut envelope = Self::delivered(header_str(&headers, CONTENT_TYPE.as_str()), body)
            .with_headers(headers);
        envelope.status = Some(status);
        envelope
    }

    pub fn with_status(mut self, code: u16, text: impl Into<String>) -> Self {
        self.status = Some(StatusLine {
            code,
            text: text.into(),
        });
        self
    }

    /// Attach response headers; the advisory byte size comes from `content-length`.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.byte_size = byte_size(&headers);
        self.headers = headers;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn category(&self) -> ContentCategory {
        ContentCategory::from_content_type(&self.content_type)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            Outcome::Delivered { payload, .. } => Some(payload),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<(ErrorKind, &str)> {
        match &self.outcome {
            Outcome::Failed { kind, message } => Some((*kind, message.as_str())),
            Outcome::Delivered { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|(kind, _)| kind)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status.as_ref().map(|s| s.code)
    }
}

/// Advisory size from a `content-length` header, 0 when absent or unparsable.
pub fn byte_size(headers: &HeaderMap) -> u64 {
    header_str(headers, CONTENT_LENGTH.as_str())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

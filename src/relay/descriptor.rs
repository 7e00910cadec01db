//! Request descriptors and the `/proxy` wire format.
//!
//! # Responsibilities
//! - Model one relay attempt ([`RequestDescriptor`])
//! - Assemble descriptors from user input ([`DescriptorBuilder`])
//! - Convert between descriptors and the JSON body of `POST /proxy`
//!
//! # Design Decisions
//! - Descriptors are plain values; the executor takes them by value so they
//!   cannot change once submitted
//! - Header keys keep the caller's spelling; comparisons ignore case
//! - Scrape mode keeps method/headers/body around but nothing reads them

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::relay::error::RelayError;

/// Which backend serves a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    #[default]
    Direct,
    Scrape,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Direct => "direct",
            RelayMode::Scrape => "scrape",
        }
    }
}

/// HTTP methods a direct relay can forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Methods whose body gets an implied JSON content type.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "" => Err(RelayError::MissingMethod),
            _ => Err(RelayError::UnsupportedMethod(s.trim().to_string())),
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// One user-supplied header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn enabled_by_default() -> bool {
    true
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
            description: String::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.key.trim().eq_ignore_ascii_case(name)
    }

    /// Enabled rows with a non-blank key are the only ones ever transmitted.
    pub fn is_transmitted(&self) -> bool {
        self.enabled && !self.key.trim().is_empty()
    }
}

/// Normalized description of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestDescriptor {
    pub target_url: String,
    pub mode: RelayMode,
    pub method: Option<HttpMethod>,
    pub headers: Vec<HeaderEntry>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn builder(url: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(url)
    }

    /// Headers that will actually be sent, in order.
    pub fn transmitted_headers(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.headers.iter().filter(|h| h.is_transmitted())
    }

    /// Value of the last transmitted header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.transmitted_headers()
            .filter(|h| h.is_named(name))
            .last()
            .map(|h| h.value.trim())
    }

    /// Whether an enabled header declares a JSON body.
    pub fn declares_json(&self) -> bool {
        self.header("content-type")
            .map(|v| v.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false)
    }

    /// Check the invariants the gateway relies on before any network activity.
    ///
    /// Returns the method for direct mode, `None` for scrape mode.
    pub fn validate(&self) -> Result<Option<HttpMethod>, RelayError> {
        if self.target_url.trim().is_empty() {
            return Err(RelayError::MissingUrl);
        }
        match self.mode {
            RelayMode::Scrape => Ok(None),
            RelayMode::Direct => self.method.map(Some).ok_or(RelayError::MissingMethod),
        }
    }

    /// Encode as the JSON body of `POST /proxy`.
    ///
    /// The body is sent as structured JSON only when an enabled header declares
    /// `application/json`; it must then parse.
    pub fn to_wire(&self) -> Result<ProxyRequest, RelayError> {
        let method = self.validate()?;
        let mut wire = ProxyRequest {
            url: Some(self.target_url.trim().to_string()),
            scrape_mode: self.mode == RelayMode::Scrape,
            ..Default::default()
        };
        if let Some(method) = method {
            wire.method = Some(method.as_str().to_string());
            wire.headers = Some(
                self.transmitted_headers()
                    .map(|h| (h.key.trim().to_string(), h.value.trim().to_string()))
                    .collect(),
            );
            wire.data = match self.body.as_deref() {
                None | Some("") => None,
                Some(body) if self.declares_json() => Some(
                    serde_json::from_str(body).map_err(|_| RelayError::InvalidJsonBody)?,
                ),
                Some(body) => Some(Value::String(body.to_string())),
            };
        }
        Ok(wire)
    }
}

/// Assembles a [`RequestDescriptor`] from loosely-typed user input.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    descriptor: RequestDescriptor,
}

impl DescriptorBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            descriptor: RequestDescriptor {
                target_url: url.into(),
                ..Default::default()
            },
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.descriptor.method = Some(method);
        self
    }

    pub fn scrape(mut self) -> Self {
        self.descriptor.mode = RelayMode::Scrape;
        self
    }

    pub fn header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_entry(HeaderEntry::new(key, value))
    }

    pub fn disabled_header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_entry(HeaderEntry::new(key, value).disabled())
    }

    pub fn header_entry(mut self, entry: HeaderEntry) -> Self {
        self.descriptor.headers.push(entry);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.descriptor.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    /// Finish, trimming the URL and rejecting descriptors the gateway would refuse.
    pub fn build(mut self) -> Result<RequestDescriptor, RelayError> {
        self.descriptor.target_url = self.descriptor.target_url.trim().to_string();
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

/// JSON body of `POST /proxy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub scrape_mode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// A string body, or any JSON value to be serialized as the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProxyRequest {
    /// Validate and convert into a descriptor.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, RelayError> {
        let target_url = self.url.unwrap_or_default().trim().to_string();
        if target_url.is_empty() {
            return Err(RelayError::MissingUrl);
        }

        let headers = self
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| HeaderEntry::new(k, v))
            .collect();
        let body = match self.data {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        let (mode, method) = if self.scrape_mode {
            // Ignored downstream, so an unknown method is not worth rejecting.
            let method = self.method.as_deref().and_then(|m| m.parse().ok());
            (RelayMode::Scrape, method)
        } else {
            let method: HttpMethod = self
                .method
                .as_deref()
                .ok_or(RelayError::MissingMethod)?
                .parse()?;
            (RelayMode::Direct, Some(method))
        };

        Ok(RequestDescriptor {
            target_url,
            mode,
            method,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!(matches!(
            "".parse::<HttpMethod>(),
            Err(RelayError::MissingMethod)
        ));
        assert!(matches!(
            "BREW".parse::<HttpMethod>(),
            Err(RelayError::UnsupportedMethod(m)) if m == "BREW"
        ));
        assert!(HttpMethod::Put.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            RequestDescriptor::builder("   ").method(HttpMethod::Get).build(),
            Err(RelayError::MissingUrl)
        ));
        assert!(matches!(
            RequestDescriptor::builder("https://x").build(),
            Err(RelayError::MissingMethod)
        ));

        let scrape = RequestDescriptor::builder(" https://x ").scrape().build().unwrap();
        assert_eq!(scrape.target_url, "https://x");
        assert_eq!(scrape.mode, RelayMode::Scrape);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive_and_skips_disabled() {
        let descriptor = RequestDescriptor::builder("https://x")
            .method(HttpMethod::Post)
            .header("CONTENT-TYPE", "text/plain")
            .disabled_header("content-type", "application/json")
            .header("", "orphan value")
            .build()
            .unwrap();

        assert_eq!(descriptor.header("Content-Type"), Some("text/plain"));
        assert!(!descriptor.declares_json());
        assert_eq!(descriptor.transmitted_headers().count(), 1);
    }

    #[test]
    fn test_wire_parses_json_body_only_when_declared() {
        let json_body = RequestDescriptor::builder("https://x")
            .method(HttpMethod::Post)
            .header("content-type", "application/json; charset=utf-8")
            .body(r#"{"k":"v"}"#)
            .build()
            .unwrap();
        assert_eq!(json_body.to_wire().unwrap().data, Some(json!({"k": "v"})));

        let text_body = RequestDescriptor::builder("https://x")
            .method(HttpMethod::Post)
            .body(r#"{"k":"v"}"#)
            .build()
            .unwrap();
        assert_eq!(
            text_body.to_wire().unwrap().data,
            Some(Value::String(r#"{"k":"v"}"#.into()))
        );
    }

    #[test]
    fn test_wire_rejects_invalid_declared_json() {
        let descriptor = RequestDescriptor::builder("https://x")
            .method(HttpMethod::Put)
            .header("Content-Type", "application/json")
            .body("{not json")
            .build()
            .unwrap();
        assert!(matches!(descriptor.to_wire(), Err(RelayError::InvalidJsonBody)));
    }

    #[test]
    fn test_scrape_wire_omits_direct_fields() {
        let descriptor = RequestDescriptor::builder("https://x")
            .scrape()
            .method(HttpMethod::Delete)
            .header("x-token", "secret")
            .body("payload")
            .build()
            .unwrap();

        let wire = serde_json::to_value(descriptor.to_wire().unwrap()).unwrap();
        assert_eq!(wire, json!({"url": "https://x", "scrapeMode": true}));
    }

    #[test]
    fn test_into_descriptor_from_json() {
        let request: ProxyRequest = serde_json::from_value(json!({
            "url": "https://x",
            "method": "post",
            "data": {"k": "v"},
        }))
        .unwrap();
        let descriptor = request.into_descriptor().unwrap();

        assert_eq!(descriptor.mode, RelayMode::Direct);
        assert_eq!(descriptor.method, Some(HttpMethod::Post));
        assert_eq!(descriptor.body.as_deref(), Some(r#"{"k":"v"}"#));
    }

    #[test]
    fn test_into_descriptor_validation_order() {
        let empty: ProxyRequest = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(empty.into_descriptor(), Err(RelayError::MissingUrl)));

        let no_method: ProxyRequest = serde_json::from_value(json!({"url": "https://x"})).unwrap();
        assert!(matches!(
            no_method.into_descriptor(),
            Err(RelayError::MissingMethod)
        ));

        let scrape: ProxyRequest = serde_json::from_value(json!({
            "url": "https://x",
            "scrapeMode": true,
            "method": "TELEPORT",
        }))
        .unwrap();
        let descriptor = scrape.into_descriptor().unwrap();
        assert_eq!(descriptor.mode, RelayMode::Scrape);
        assert_eq!(descriptor.method, None);
    }

    #[test]
    fn test_empty_and_null_data_mean_no_body() {
        for data in [json!(null), json!("")] {
            let request: ProxyRequest = serde_json::from_value(json!({
                "url": "https://x",
                "method": "POST",
                "data": data,
            }))
            .unwrap();
            assert_eq!(request.into_descriptor().unwrap().body, None);
        }
    }
}

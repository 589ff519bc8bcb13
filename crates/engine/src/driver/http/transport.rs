//! HTTP transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

const BACKEND: &str = "http";

/// Fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,

    /// Path appended to `url` when non-empty.
    pub uri: String,

    pub method: String,
    pub headers: Vec<(String, String)>,

    /// Transport-specific options.
    pub options: serde_json::Value,

    /// `None` means no per-request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// `url` joined with `uri`.
    pub fn target(&self) -> String {
        if self.uri.is_empty() {
            return self.url.clone();
        }
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.uri.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends resolved requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> EngineResult<HttpResponse>;
}

/// Transport over a shared `reqwest::Client`.
///
/// Recognized transport options:
/// - `query`: object of query-string parameters
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> EngineResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| {
                EngineError::DriverConfiguration(format!("invalid HTTP method '{}'", request.method))
            })?;

        let mut builder = self.client.request(method, request.target());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(params) = request.options.get("query").and_then(|q| q.as_object()) {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k.clone(), s.clone()),
                    other => (k.clone(), other.to_string()),
                })
                .collect();
            builder = builder.query(&pairs);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(EngineError::backend(BACKEND))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(EngineError::backend(BACKEND))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, uri: &str) -> HttpRequest {
        HttpRequest {
            url: url.into(),
            uri: uri.into(),
            method: "GET".into(),
            headers: Vec::new(),
            options: serde_json::Value::Null,
            timeout: None,
        }
    }

    #[test]
    fn target_joins_uri() {
        assert_eq!(request("http://api.local/", "/users").target(), "http://api.local/users");
        assert_eq!(request("http://api.local/v1", "").target(), "http://api.local/v1");
    }

    #[test]
    fn success_range() {
        let response = HttpResponse {
            status: 204,
            content_type: String::new(),
            body: String::new(),
        };
        assert!(response.is_success());
        assert!(!HttpResponse { status: 302, ..response }.is_success());
    }
}

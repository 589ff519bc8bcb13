//! HTTP data-source driver.
//!
//! Each request fetches the whole resource. Paging is emulated: the first
//! page of a scroll session caches the decoded content in the scroll context
//! and later pages slice that cache.

mod transport;

pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Driver;
use crate::error::{EngineError, EngineResult};
use crate::query::{FilterOperator, OptionBag, Query, ScrollContext};
use crate::result::{QueryResult, RawRow, ResultBuilder};

/// Options read by [`HttpDriver`].
pub const SUPPORTED_OPTIONS: &[&str] = &[
    "max_query_time",
    "html_formatter",
    "json_formatter",
    "url",
    "uri",
    "url_generator",
    "method",
    "headers",
    "options",
    "http",
];

/// Request settings. Empty fields are unset and fall through to the next
/// level of precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub url: String,
    pub uri: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub options: serde_json::Value,
}

impl HttpConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Json,
    Html,
    Xml,
    Other,
}

impl ContentKind {
    fn from_header(content_type: &str) -> Self {
        content_type
            .split(';')
            .map(|part| part.trim().to_lowercase())
            .find_map(|part| match part.as_str() {
                "application/json" => Some(ContentKind::Json),
                "text/html" => Some(ContentKind::Html),
                "text/xml" => Some(ContentKind::Xml),
                _ => None,
            })
            .unwrap_or(ContentKind::Other)
    }
}

/// Driver for HTTP endpoints returning JSON or HTML.
#[derive(Clone)]
pub struct HttpDriver {
    transport: Arc<dyn HttpTransport>,
    defaults: HttpConfig,
}

impl HttpDriver {
    /// Driver with `GET` as the default method and no default URL.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            defaults: HttpConfig::default().with_method("GET"),
        }
    }

    /// Replace the driver defaults. An empty method keeps `GET`.
    pub fn with_defaults(mut self, defaults: HttpConfig) -> Self {
        let method = if defaults.method.is_empty() {
            "GET".to_string()
        } else {
            defaults.method.clone()
        };
        self.defaults = HttpConfig { method, ..defaults };
        self
    }

    /// Resolve the request for `query`.
    ///
    /// Precedence for every setting: query option, then the `http` override
    /// in the option bag, then the driver default.
    fn build_request(&self, query: &Query) -> EngineResult<HttpRequest> {
        let options = &query.options;
        let overrides = http_override(options)?;

        let uri = first_set([
            options.text("uri")?,
            Some(overrides.uri.clone()),
            Some(self.defaults.uri.clone()),
        ]);
        let method = first_set([
            options.text("method")?,
            Some(overrides.method.clone()),
            Some(self.defaults.method.clone()),
        ]);
        let headers = [
            options.headers("headers")?,
            Some(overrides.headers.clone()),
            Some(self.defaults.headers.clone()),
        ]
        .into_iter()
        .flatten()
        .find(|h| !h.is_empty())
        .unwrap_or_default();
        let transport_options = [
            options.json("options")?.cloned(),
            Some(overrides.options.clone()),
            Some(self.defaults.options.clone()),
        ]
        .into_iter()
        .flatten()
        .find(|o| !o.is_null())
        .unwrap_or(serde_json::Value::Null);

        let timeout = match options.integer("max_query_time") {
            Ok(Some(seconds)) if seconds < 0 => {
                return Err(EngineError::DriverConfiguration("invalid query timeout".into()));
            }
            Ok(Some(0) | None) => None,
            Ok(Some(seconds)) => Some(Duration::from_secs(seconds.unsigned_abs())),
            Err(_) => return Err(EngineError::DriverConfiguration("invalid query timeout".into())),
        };

        let url = if let Some(generator) = options.url_generator("url_generator")? {
            generator(query)
        } else if let Some(url) = options.text("url")?.filter(|u| !u.is_empty()) {
            url
        } else if let Some(url) = query
            .filter_value("url", FilterOperator::In)
            .and_then(|v| v.as_list().first().and_then(|first| first.as_string()))
        {
            url
        } else {
            first_set([Some(overrides.url.clone()), Some(self.defaults.url.clone())])
        };

        if url.trim().is_empty() {
            return Err(EngineError::DriverConfiguration("empty URL provided".into()));
        }
        url::Url::parse(&url)
            .map_err(|e| EngineError::DriverConfiguration(format!("invalid URL '{url}': {e}")))?;

        Ok(HttpRequest {
            url,
            uri,
            method,
            headers,
            options: transport_options,
            timeout,
        })
    }

    /// Decode a successful response into row objects.
    fn decode(&self, query: &Query, response: &HttpResponse) -> EngineResult<Vec<serde_json::Value>> {
        match ContentKind::from_header(&response.content_type) {
            ContentKind::Json => {
                let json: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
                    EngineError::upstream("http", format!("invalid JSON response: {e}"))
                })?;
                match query.options.json_formatter("json_formatter")? {
                    Some(formatter) => Ok(formatter(&json, &query.fields)),
                    None => Ok(vec![json]),
                }
            }
            ContentKind::Html => match query.options.html_formatter("html_formatter")? {
                Some(formatter) => Ok(formatter(&response.body, &query.fields)),
                None => Ok(Vec::new()),
            },
            ContentKind::Xml | ContentKind::Other => Ok(Vec::new()),
        }
    }
}

fn http_override(options: &OptionBag) -> EngineResult<HttpConfig> {
    let invalid = || EngineError::DriverConfiguration("invalid HTTP configuration provided".into());
    match options.json("http") {
        Ok(Some(value)) => serde_json::from_value(value.clone()).map_err(|_| invalid()),
        Ok(None) => Ok(HttpConfig::default()),
        Err(_) => Err(invalid()),
    }
}

fn first_set<const N: usize>(candidates: [Option<String>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn slice(rows: &[serde_json::Value], offset: u64, limit: u64) -> Vec<serde_json::Value> {
    let take = if limit == 0 { usize::MAX } else { limit as usize };
    rows.iter()
        .skip(offset as usize)
        .take(take)
        .cloned()
        .collect()
}

#[async_trait]
impl Driver for HttpDriver {
    fn supported_options(&self) -> &[&'static str] {
        SUPPORTED_OPTIONS
    }

    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        let cached = scroll
            .as_deref()
            .and_then(ScrollContext::cached_rows)
            .filter(|rows| !rows.is_empty())
            .map(<[_]>::to_vec);

        let (page, total) = if let Some(content) = cached {
            let total = content.len() as u64;
            if let Some(ctx) = scroll
                && query.offset + query.limit > total
            {
                ctx.stop();
            }
            (slice(&content, query.offset, query.limit), total)
        } else {
            let request = self.build_request(query)?;
            tracing::debug!(
                url = %request.target(),
                method = %request.method,
                offset = query.offset,
                limit = query.limit,
                "sending HTTP data-source request"
            );
            let response = self.transport.send(request).await?;
            let content = if response.is_success() {
                self.decode(query, &response)?
            } else {
                tracing::debug!(status = response.status, "non-success response, empty page");
                Vec::new()
            };
            let total = content.len() as u64;
            let more_than_a_page = query.limit > 0 && total > query.limit;
            if let Some(ctx) = scroll {
                ctx.cache_rows(content.clone());
                if !more_than_a_page {
                    ctx.stop();
                }
            }
            (slice(&content, query.offset, query.limit), total)
        };

        let rows = page.into_iter().map(RawRow::Json).collect();
        let mut result = builder.build(rows, query);
        result.count = total;
        Ok(result)
    }
}

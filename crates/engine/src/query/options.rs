//! Backend-specific option bag.
//!
//! Options are advisory for the engine: drivers read the keys they
//! understand and the engine only logs keys a driver does not list in
//! `supported_options`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::query::Query;

/// Maps a decoded JSON body to row objects projected on the query fields.
pub type JsonFormatter = Arc<dyn Fn(&serde_json::Value, &[String]) -> Vec<serde_json::Value> + Send + Sync>;

/// Maps an HTML body to row objects projected on the query fields.
pub type HtmlFormatter = Arc<dyn Fn(&str, &[String]) -> Vec<serde_json::Value> + Send + Sync>;

/// Computes the request URL from the query.
pub type UrlGenerator = Arc<dyn Fn(&Query) -> String + Send + Sync>;

/// One option value.
#[derive(Clone)]
pub enum OptionValue {
    Text(String),
    Integer(i64),
    Headers(Vec<(String, String)>),
    Json(serde_json::Value),
    JsonFormatter(JsonFormatter),
    HtmlFormatter(HtmlFormatter),
    UrlGenerator(UrlGenerator),
}

impl OptionValue {
    fn variant_name(&self) -> &'static str {
        match self {
            OptionValue::Text(_) => "text",
            OptionValue::Integer(_) => "integer",
            OptionValue::Headers(_) => "headers",
            OptionValue::Json(_) => "json",
            OptionValue::JsonFormatter(_) => "json formatter",
            OptionValue::HtmlFormatter(_) => "html formatter",
            OptionValue::UrlGenerator(_) => "url generator",
        }
    }
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            OptionValue::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            OptionValue::Headers(h) => f.debug_tuple("Headers").field(h).finish(),
            OptionValue::Json(j) => f.debug_tuple("Json").field(j).finish(),
            other => write!(f, "{}(..)", other.variant_name()),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<serde_json::Value> for OptionValue {
    fn from(value: serde_json::Value) -> Self {
        OptionValue::Json(value)
    }
}

/// Named options attached to one collection's criteria.
#[derive(Debug, Clone, Default)]
pub struct OptionBag {
    values: BTreeMap<String, OptionValue>,
}

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text option. Integers are accepted and rendered as text.
    pub fn text(&self, key: &str) -> EngineResult<Option<String>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Text(s)) => Ok(Some(s.clone())),
            Some(OptionValue::Integer(i)) => Ok(Some(i.to_string())),
            Some(other) => Err(wrong_variant(key, "text", other)),
        }
    }

    /// Integer option. Numeric text is accepted.
    pub fn integer(&self, key: &str) -> EngineResult<Option<i64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Integer(i)) => Ok(Some(*i)),
            Some(OptionValue::Text(s)) => s.trim().parse().map(Some).map_err(|_| {
                EngineError::DriverConfiguration(format!("option '{key}' must be an integer"))
            }),
            Some(other) => Err(wrong_variant(key, "integer", other)),
        }
    }

    pub fn headers(&self, key: &str) -> EngineResult<Option<Vec<(String, String)>>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Headers(h)) => Ok(Some(h.clone())),
            Some(other) => Err(wrong_variant(key, "headers", other)),
        }
    }

    pub fn json(&self, key: &str) -> EngineResult<Option<&serde_json::Value>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Json(j)) => Ok(Some(j)),
            Some(other) => Err(wrong_variant(key, "json", other)),
        }
    }

    pub fn json_formatter(&self, key: &str) -> EngineResult<Option<JsonFormatter>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::JsonFormatter(f)) => Ok(Some(Arc::clone(f))),
            Some(other) => Err(wrong_variant(key, "json formatter", other)),
        }
    }

    pub fn html_formatter(&self, key: &str) -> EngineResult<Option<HtmlFormatter>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::HtmlFormatter(f)) => Ok(Some(Arc::clone(f))),
            Some(other) => Err(wrong_variant(key, "html formatter", other)),
        }
    }

    pub fn url_generator(&self, key: &str) -> EngineResult<Option<UrlGenerator>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::UrlGenerator(f)) => Ok(Some(Arc::clone(f))),
            Some(other) => Err(wrong_variant(key, "url generator", other)),
        }
    }
}

fn wrong_variant(key: &str, expected: &str, found: &OptionValue) -> EngineError {
    EngineError::DriverConfiguration(format!(
        "option '{key}' must be {expected}, got {}",
        found.variant_name()
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut bag = OptionBag::new();
        bag.insert("method", "POST");
        bag.insert("max_query_time", 5_i64);
        assert_eq!(bag.text("method").unwrap().as_deref(), Some("POST"));
        assert_eq!(bag.integer("max_query_time").unwrap(), Some(5));
        assert_eq!(bag.text("missing").unwrap(), None);
    }

    #[test]
    fn wrong_variant_is_configuration_error() {
        let mut bag = OptionBag::new();
        bag.insert("headers", "x-api-key: 1");
        let err = bag.headers("headers").unwrap_err();
        assert!(matches!(err, EngineError::DriverConfiguration(_)));
        assert!(err.to_string().contains("headers"));
    }

    #[test]
    fn numeric_text_is_an_integer() {
        let mut bag = OptionBag::new();
        bag.insert("max_query_time", "30");
        assert_eq!(bag.integer("max_query_time").unwrap(), Some(30));
        bag.insert("max_query_time", "soon");
        assert!(bag.integer("max_query_time").is_err());
    }

    #[test]
    fn debug_hides_closures() {
        let mut bag = OptionBag::new();
        let generator: UrlGenerator = Arc::new(|_| "http://localhost".to_string());
        bag.insert("url_generator", OptionValue::UrlGenerator(generator));
        assert!(format!("{bag:?}").contains("url generator(..)"));
    }
}

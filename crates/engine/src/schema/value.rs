//! Tagged row values.

use serde::Serialize;

use crate::query::FilterValue;
use crate::result::Entity;

/// A single field value in a fetched row.
///
/// Rows never hold open-ended records: scalars follow the field-type
/// taxonomy, and relation aliases hold `Entity`/`Entities`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Entity(Box<Entity>),
    Entities(Vec<Entity>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&[Entity]> {
        match self {
            Value::Entities(items) => Some(items),
            _ => None,
        }
    }

    /// Canonical string used to match keys across backends.
    ///
    /// `Integer(1)`, `Float(1.0)` and `Text("1")` share the key `"1"`.
    /// Returns `None` for nulls and nested values.
    pub fn match_key(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Convert a scalar (or list of scalars) into a filter value.
    pub fn to_filter_value(&self) -> Option<FilterValue> {
        match self {
            Value::Bool(b) => Some(FilterValue::Boolean(*b)),
            Value::Integer(i) => Some(FilterValue::Integer(*i)),
            Value::Float(f) => Some(FilterValue::Float(*f)),
            Value::Text(s) => Some(FilterValue::String(s.clone())),
            Value::List(items) => Some(FilterValue::List(
                items.iter().filter_map(Value::to_filter_value).collect(),
            )),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(values: Vec<i64>) -> Self {
        Value::List(values.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::List(values.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<bool>> for Value {
    fn from(values: Vec<bool>) -> Self {
        Value::List(values.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<&str>> for Value {
    fn from(values: Vec<&str>) -> Self {
        Value::List(values.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(values: Vec<String>) -> Self {
        Value::List(values.into_iter().map(Value::from).collect())
    }
}

//! Filter, sort and aggregation primitives shared by every driver.

use serde::{Deserialize, Serialize};

/// Comparison operators for filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Full-text match (substring on backends without an inverted index).
    FullTextMatch,
    /// Greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than.
    LessThan,
    /// Less than or equal.
    LessOrEqual,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
}

impl FilterOperator {
    /// Range operators compare against a numeric bound.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            FilterOperator::GreaterThan
                | FilterOperator::GreaterOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessOrEqual
        )
    }

    /// Set operators test membership in a list.
    pub fn is_set(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

/// Filter value types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    /// String value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// List of values (for In/NotIn operators).
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Convert to string representation.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(s.clone()),
            FilterValue::Integer(i) => Some(i.to_string()),
            FilterValue::Float(f) => Some(f.to_string()),
            FilterValue::Boolean(b) => Some(b.to_string()),
            FilterValue::List(_) => None,
        }
    }

    /// Convert to integer if possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FilterValue::Integer(i) => Some(*i),
            FilterValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to float if possible. Numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Integer(i) => Some(*i as f64),
            FilterValue::Float(f) => Some(*f),
            FilterValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Flatten into a list of scalars. A scalar becomes a one-item list.
    pub fn as_list(&self) -> Vec<FilterValue> {
        match self {
            FilterValue::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Filter condition on one field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryFilter {
    /// Field to filter on.
    pub field: String,

    /// Comparison operator.
    pub operator: FilterOperator,

    /// Value to compare against.
    pub value: FilterValue,
}

/// Sort specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuerySort {
    /// Field to sort by.
    pub field: String,

    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Aggregation kinds. Only `Facet` is executed; the rest are reserved and
/// rejected by every driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Facet,
    Count,
    Sum,
    Average,
    Min,
    Max,
}

/// Default number of facet buckets.
pub const DEFAULT_FACET_LIMIT: u64 = 10;

/// Aggregation request on one field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub field: String,

    /// Buckets to skip (default: 0).
    #[serde(default)]
    pub offset: Option<u64>,

    /// Buckets to return (default: 10).
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Aggregation {
    /// Facet on `field` with default paging.
    pub fn facet(field: impl Into<String>) -> Self {
        Self {
            kind: AggregationKind::Facet,
            field: field.into(),
            offset: None,
            limit: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    pub fn effective_limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_FACET_LIMIT)
    }
}

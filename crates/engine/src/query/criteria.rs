//! Caller-side request description, keyed by collection alias.

use std::collections::HashMap;

use super::options::{OptionBag, OptionValue};
use super::types::{Aggregation, FilterOperator, FilterValue, QueryFilter, QuerySort, SortDirection};

/// Request parameters for one collection (one model alias).
#[derive(Debug, Clone, Default)]
pub struct CollectionCriteria {
    pub filters: Vec<QueryFilter>,
    pub sorts: Vec<QuerySort>,
    pub limit: Option<u64>,
    pub offset: u64,

    /// Truncate each parent's attached collection to this many rows.
    pub limit_by_parent: Option<u64>,

    pub aggregations: Vec<Aggregation>,
    pub options: OptionBag,
}

impl CollectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter. A filter on the same field and operator replaces the
    /// earlier value.
    pub fn add_filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        let field = field.into();
        self.filters
            .retain(|f| !(f.field == field && f.operator == operator));
        self.filters.push(QueryFilter {
            field,
            operator,
            value: value.into(),
        });
        self
    }

    pub fn add_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(QuerySort {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn set_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn set_limit_by_parent(mut self, limit: u64) -> Self {
        self.limit_by_parent = Some(limit);
        self
    }

    pub fn add_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn set_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key, value);
        self
    }
}

/// Request description for a whole model tree.
///
/// Aliases without criteria use an empty [`CollectionCriteria`].
#[derive(Debug, Clone, Default)]
pub struct QueryCriteria {
    collections: HashMap<String, CollectionCriteria>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_collection(mut self, alias: impl Into<String>, criteria: CollectionCriteria) -> Self {
        self.collections.insert(alias.into(), criteria);
        self
    }

    pub fn collection(&self, alias: &str) -> Option<&CollectionCriteria> {
        self.collections.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

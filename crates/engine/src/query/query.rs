//! Concrete per-node request handed to a driver.

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::schema::Schema;

use super::options::OptionBag;
use super::types::{Aggregation, AggregationKind, FilterOperator, FilterValue, QueryFilter, QuerySort};

/// One request against one schema. Built fresh for every model node on every
/// engine call; derived copies are made with [`Query::without_filters_on`].
#[derive(Debug, Clone)]
pub struct Query {
    /// Schema name.
    pub name: String,

    /// Model alias this query serves.
    pub alias: String,

    /// Projected fields. Empty means every field the backend returns.
    pub fields: Vec<String>,

    pub filters: Vec<QueryFilter>,
    pub sorts: Vec<QuerySort>,
    pub offset: u64,
    pub limit: u64,
    pub aggregations: Vec<Aggregation>,
    pub schema: Arc<Schema>,
    pub options: OptionBag,
}

impl Query {
    /// Empty query over `schema` projecting the fields of `view`.
    pub fn new(schema: Arc<Schema>, view: &str, alias: impl Into<String>) -> Self {
        Self {
            name: schema.name().to_string(),
            alias: alias.into(),
            fields: schema.fields_for(view).to_vec(),
            filters: Vec::new(),
            sorts: Vec::new(),
            offset: 0,
            limit: 0,
            aggregations: Vec::new(),
            schema,
            options: OptionBag::new(),
        }
    }

    /// Check every filter, sort and aggregation against the schema.
    ///
    /// Runs before the query reaches a driver, so violations never cause I/O.
    pub fn validate(&self) -> EngineResult<()> {
        for filter in &self.filters {
            self.validate_filter(filter)?;
        }
        for sort in &self.sorts {
            if !self.schema.declares(&sort.field) {
                return Err(EngineError::schema_violation(
                    &sort.field,
                    format!("cannot sort on undeclared field of '{}'", self.name),
                ));
            }
        }
        for aggregation in &self.aggregations {
            if aggregation.kind != AggregationKind::Facet {
                return Err(EngineError::UnsupportedOperation(format!(
                    "{:?} aggregation on '{}'",
                    aggregation.kind, aggregation.field
                )));
            }
            if !self.schema.declares(&aggregation.field) {
                return Err(EngineError::schema_violation(
                    &aggregation.field,
                    format!("cannot aggregate on undeclared field of '{}'", self.name),
                ));
            }
        }
        Ok(())
    }

    fn validate_filter(&self, filter: &QueryFilter) -> EngineResult<()> {
        if !self.schema.is_filterable(&filter.field) {
            return Err(EngineError::schema_violation(
                &filter.field,
                "field is not filterable",
            ));
        }
        let field_type = self.schema.field_type(&filter.field).unwrap_or_default();
        if filter.operator.is_range() {
            if !field_type.is_ordered() {
                return Err(EngineError::schema_violation(
                    &filter.field,
                    format!("range filter requires a numeric field, found {field_type:?}"),
                ));
            }
            if field_type.is_numeric() && filter.value.as_f64().is_none() {
                return Err(EngineError::schema_violation(
                    &filter.field,
                    "range filter value must be numeric",
                ));
            }
        }
        Ok(())
    }

    /// Derived copy with every filter on `field` removed. `self` is left
    /// untouched.
    pub fn without_filters_on(&self, field: &str) -> Query {
        let mut derived = self.clone();
        derived.filters.retain(|f| f.field != field);
        derived
    }

    /// Value of the first filter on `field` with `operator`.
    pub fn filter_value(&self, field: &str, operator: FilterOperator) -> Option<&FilterValue> {
        self.filters
            .iter()
            .find(|f| f.field == field && f.operator == operator)
            .map(|f| &f.value)
    }
}

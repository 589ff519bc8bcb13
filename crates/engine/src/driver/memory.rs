//! In-process query evaluation.
//!
//! Shared by [`InMemoryDriver`] and the flat-file driver: filters, facets,
//! sorting and paging over already typed rows.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use super::Driver;
use crate::error::{EngineError, EngineResult};
use crate::query::{FilterOperator, FilterValue, Query, QueryFilter, ScrollContext, SortDirection};
use crate::result::{Aggregations, Entity, FacetBucket, QueryResult, RawRow, ResultBuilder};
use crate::schema::Value;

/// Outcome of [`evaluate`]: the requested page plus totals.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub page: Vec<Entity>,
    pub count: u64,
    pub aggregations: Option<Aggregations>,
}

/// Evaluate `query` against `rows`.
///
/// A zero limit returns every matching row after the offset.
pub fn evaluate(query: &Query, rows: &[Entity]) -> EngineResult<Evaluation> {
    query.validate()?;

    let mut matched: Vec<&Entity> = rows
        .iter()
        .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
        .collect();
    let count = matched.len() as u64;

    let aggregations = if query.aggregations.is_empty() {
        None
    } else {
        let mut facets = Aggregations::default();
        for aggregation in &query.aggregations {
            let derived = query.without_filters_on(&aggregation.field);
            let scope: Vec<&Entity> = rows
                .iter()
                .filter(|row| derived.filters.iter().all(|f| matches_filter(row, f)))
                .collect();
            let buckets = facet_buckets(&scope, &aggregation.field)
                .into_iter()
                .skip(aggregation.effective_offset() as usize)
                .take(aggregation.effective_limit() as usize)
                .collect();
            facets.facets.insert(aggregation.field.clone(), buckets);
        }
        Some(facets)
    };

    if !query.sorts.is_empty() {
        matched.sort_by(|a, b| {
            for sort in &query.sorts {
                let left = a.get(&sort.field).unwrap_or(&Value::Null);
                let right = b.get(&sort.field).unwrap_or(&Value::Null);
                let ordering = match sort.direction {
                    SortDirection::Asc => compare_values(left, right),
                    SortDirection::Desc => compare_values(right, left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let take = if query.limit == 0 {
        usize::MAX
    } else {
        query.limit as usize
    };
    let page = matched
        .into_iter()
        .skip(query.offset as usize)
        .take(take)
        .cloned()
        .collect();

    Ok(Evaluation {
        page,
        count,
        aggregations,
    })
}

/// Whether `row` satisfies `filter`. Null and missing values fail every
/// operator except `NotIn`.
pub fn matches_filter(row: &Entity, filter: &QueryFilter) -> bool {
    let value = row.get(&filter.field).unwrap_or(&Value::Null);
    let items: &[Value] = match value {
        Value::List(items) => items,
        single => std::slice::from_ref(single),
    };

    match filter.operator {
        FilterOperator::FullTextMatch => {
            let Some(needle) = filter.value.as_string() else {
                return false;
            };
            let needle = needle.to_lowercase();
            items
                .iter()
                .filter_map(Value::match_key)
                .any(|text| text.to_lowercase().contains(&needle))
        }
        FilterOperator::In => {
            let wanted = filter_keys(&filter.value);
            items
                .iter()
                .filter_map(Value::match_key)
                .any(|key| wanted.contains(&key))
        }
        FilterOperator::NotIn => {
            let unwanted = filter_keys(&filter.value);
            !items
                .iter()
                .filter_map(Value::match_key)
                .any(|key| unwanted.contains(&key))
        }
        operator => items.iter().any(|item| {
            let Some(ordering) = compare_to_bound(item, &filter.value) else {
                return false;
            };
            match operator {
                FilterOperator::GreaterThan => ordering == Ordering::Greater,
                FilterOperator::GreaterOrEqual => ordering != Ordering::Less,
                FilterOperator::LessThan => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }),
    }
}

fn filter_keys(value: &FilterValue) -> HashSet<String> {
    value
        .as_list()
        .iter()
        .filter_map(FilterValue::as_string)
        .collect()
}

fn compare_to_bound(item: &Value, bound: &FilterValue) -> Option<Ordering> {
    if item.is_null() {
        return None;
    }
    match (item.as_f64(), bound.as_f64()) {
        (Some(left), Some(right)) => left.partial_cmp(&right),
        _ => {
            let left = item.match_key()?;
            let right = bound.as_string()?;
            Some(left.cmp(&right))
        }
    }
}

/// Total order used for sorting and facet tie-breaks. Nulls sort first;
/// numbers compare numerically, everything else by its match key.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let numeric = |v: &Value| matches!(v, Value::Integer(_) | Value::Float(_));
    if numeric(left)
        && numeric(right)
        && let (Some(l), Some(r)) = (left.as_f64(), right.as_f64())
    {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    left.match_key().cmp(&right.match_key())
}

/// Group `rows` by `field`, count-descending with ties broken by value.
fn facet_buckets(rows: &[&Entity], field: &str) -> Vec<FacetBucket> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<FacetBucket> = Vec::new();
    for row in rows {
        let value = row.get(field).unwrap_or(&Value::Null);
        let items: &[Value] = match value {
            Value::List(items) => items,
            single => std::slice::from_ref(single),
        };
        for item in items {
            let Some(key) = item.match_key() else {
                continue;
            };
            match index.get(&key) {
                Some(&slot) => buckets[slot].count += 1,
                None => {
                    index.insert(key, buckets.len());
                    buckets.push(FacetBucket {
                        name: item.clone(),
                        count: 1,
                    });
                }
            }
        }
    }
    buckets.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| compare_values(&a.name, &b.name))
    });
    buckets
}

/// Driver over named in-process tables of typed rows.
///
/// Tables are keyed by the schema's source name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriver {
    tables: HashMap<String, Vec<Entity>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, source_name: impl Into<String>, rows: Vec<Entity>) -> Self {
        self.tables.insert(source_name.into(), rows);
        self
    }

    pub fn table(&self, source_name: &str) -> Option<&[Entity]> {
        self.tables.get(source_name).map(Vec::as_slice)
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        let source = query.schema.source_name();
        let rows = self.tables.get(source).ok_or_else(|| {
            EngineError::DriverConfiguration(format!("no in-memory table named '{source}'"))
        })?;

        tracing::debug!(
            table = %source,
            offset = query.offset,
            limit = query.limit,
            filters = query.filters.len(),
            "evaluating in-memory query"
        );

        let evaluation = evaluate(query, rows)?;
        let rows = evaluation.page.into_iter().map(RawRow::Entity).collect();
        let mut result = builder.build(rows, query);
        result.count = evaluation.count;
        result.aggregations = evaluation.aggregations;

        if let Some(ctx) = scroll {
            ctx.advance(query.limit, result.count);
        }
        Ok(result)
    }
}

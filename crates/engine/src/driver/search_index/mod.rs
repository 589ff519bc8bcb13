//! Inverted-index search driver (RediSearch).
//!
//! This module provides:
//! - SearchIndexDriver: validates, compiles filters and runs searches/facets
//! - translate: the filter to query-language compiler and escaping
//! - SearchIndexClient / RedisSearchClient: the `FT.SEARCH` / `FT.AGGREGATE` transport

mod client;
pub mod translate;

pub use client::{AggregateRequest, RedisSearchClient, SearchIndexClient, SearchReply, SearchRequest};

use std::sync::Arc;

use async_trait::async_trait;

use super::Driver;
use crate::error::{EngineError, EngineResult};
use crate::query::{Aggregation, Query, ScrollContext};
use crate::result::{Aggregations, FacetBucket, QueryResult, RawRow, ResultBuilder};

/// Driver translating queries into the RediSearch query language.
///
/// The schema's source name is the index name.
#[derive(Clone)]
pub struct SearchIndexDriver {
    client: Arc<dyn SearchIndexClient>,
}

impl SearchIndexDriver {
    pub fn new(client: Arc<dyn SearchIndexClient>) -> Self {
        Self { client }
    }

    async fn facet(&self, query: &Query, aggregation: &Aggregation) -> EngineResult<Vec<FacetBucket>> {
        let derived = query.without_filters_on(&aggregation.field);
        let compiled = translate::compile_filters(&derived)?;
        let rows = self
            .client
            .aggregate(AggregateRequest {
                index: query.schema.source_name().to_string(),
                query: compiled,
                field: aggregation.field.clone(),
                offset: aggregation.effective_offset(),
                limit: aggregation.effective_limit(),
            })
            .await?;

        rows.into_iter()
            .map(|row| {
                let raw = row
                    .iter()
                    .find(|(name, _)| *name == aggregation.field)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or_default();
                let count = row
                    .iter()
                    .find(|(name, _)| name == "count")
                    .and_then(|(_, v)| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        EngineError::upstream("redisearch", "facet row without a numeric count")
                    })?;
                Ok(FacetBucket {
                    name: query.schema.value_from_text(&aggregation.field, raw),
                    count,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Driver for SearchIndexDriver {
    /// Range filters need a numeric field and set filters an enum field.
    fn validate(&self, query: &Query) -> EngineResult<()> {
        query.validate()?;
        for filter in &query.filters {
            translate::assert_filterable(&query.schema, filter)?;
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        self.validate(query)?;
        let compiled = translate::compile_filters(query)?;

        if query.sorts.len() > 1 {
            tracing::warn!(
                index = %query.schema.source_name(),
                ignored = query.sorts.len() - 1,
                "search index sorts on one key only, ignoring the rest"
            );
        }
        let sort = query
            .sorts
            .first()
            .map(|s| (s.field.clone(), s.direction));

        tracing::debug!(
            index = %query.schema.source_name(),
            query = %compiled,
            offset = query.offset,
            limit = query.limit,
            "running search-index query"
        );

        let reply = self
            .client
            .search(SearchRequest {
                index: query.schema.source_name().to_string(),
                query: compiled,
                return_fields: query.fields.clone(),
                sort,
                offset: query.offset,
                limit: query.limit,
            })
            .await?;

        let rows = reply.documents.into_iter().map(RawRow::Text).collect();
        let mut result = builder.build(rows, query);
        result.count = reply.total;

        if !query.aggregations.is_empty() {
            let mut aggregations = Aggregations::default();
            for aggregation in &query.aggregations {
                let buckets = self.facet(query, aggregation).await?;
                aggregations.facets.insert(aggregation.field.clone(), buckets);
            }
            result.aggregations = Some(aggregations);
        }

        if let Some(ctx) = scroll {
            ctx.advance(query.limit, result.count);
        }
        Ok(result)
    }
}

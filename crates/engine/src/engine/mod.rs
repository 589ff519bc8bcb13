//! Query orchestration.
//!
//! This module provides:
//! - QueryEngine: driver registry, single-page `query` and lazy `scroll`
//! - relation resolution: batched joins and custom resolvers stitched onto
//!   parent rows in process

mod relation;

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_core::Stream;

use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::error::{EngineError, EngineResult};
use crate::model::Model;
use crate::query::{
    CollectionCriteria, FilterOperator, FilterValue, Query, QueryCriteria, QueryFilter,
    ScrollContext,
};
use crate::result::{DefaultResultBuilder, Entity, QueryResult, ResultBuilder};
use crate::schema::RelationKind;

/// Entry point: dispatches model trees to registered drivers.
///
/// Configure once, then share. Every call builds its own queries and scroll
/// state.
#[derive(Clone)]
pub struct QueryEngine {
    config: EngineConfig,
    drivers: HashMap<String, Arc<dyn Driver>>,
    builder: Arc<dyn ResultBuilder>,
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            drivers: HashMap::new(),
            builder: Arc::new(DefaultResultBuilder),
        }
    }

    /// Register the driver serving schemas whose source type is `tag`.
    pub fn register_driver(mut self, tag: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        self.drivers.insert(tag.into(), driver);
        self
    }

    /// Replace the result builder used for every driver call.
    pub fn with_result_builder(mut self, builder: Arc<dyn ResultBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn driver(&self, tag: &str) -> EngineResult<&Arc<dyn Driver>> {
        self.drivers
            .get(tag)
            .ok_or_else(|| EngineError::DriverNotRegistered(tag.to_string()))
    }

    /// Fetch one page of the root model with every relation resolved.
    pub async fn query(&self, model: &Model, criteria: &QueryCriteria) -> EngineResult<QueryResult> {
        self.prepare(model, criteria)?;
        let root = criteria.collection(model.alias());
        let offset = root.map_or(0, |c| c.offset);
        let limit = self.config.page_size(root.and_then(|c| c.limit));
        self.execute_page(model, criteria, offset, limit, None).await
    }

    /// Lazily stream every root entity, one page request per exhausted page.
    ///
    /// The stream ends when the driver stops the scroll context, when a page
    /// comes back short, or after yielding the first error. Each call starts
    /// an independent session.
    pub fn scroll<'a>(
        &'a self,
        model: &'a Model,
        criteria: &'a QueryCriteria,
    ) -> impl Stream<Item = EngineResult<Entity>> + Send + 'a {
        try_stream! {
            self.prepare(model, criteria)?;
            let root = criteria.collection(model.alias());
            let page_size = self.config.page_size(root.and_then(|c| c.limit));
            let mut offset = root.map_or(0, |c| c.offset);
            let mut ctx = ScrollContext::new();

            loop {
                let page = self
                    .execute_page(model, criteria, offset, page_size, Some(&mut ctx))
                    .await?;
                let returned = page.entities.len() as u64;
                let total = page.count;
                tracing::debug!(
                    alias = %model.alias(),
                    offset,
                    returned,
                    total,
                    "scroll page fetched"
                );
                for entity in page.entities {
                    yield entity;
                }
                offset += page_size;
                if ctx.is_stopped() || returned < page_size || offset >= total {
                    break;
                }
            }
        }
    }

    /// Validate the model tree and every node's criteria before any I/O.
    fn prepare(&self, model: &Model, criteria: &QueryCriteria) -> EngineResult<()> {
        model.validate()?;
        self.prepare_node(model, criteria, None)
    }

    fn prepare_node(
        &self,
        model: &Model,
        criteria: &QueryCriteria,
        injected: Option<&str>,
    ) -> EngineResult<()> {
        let driver = self.driver(model.schema().source_type())?;
        let mut query = self.build_query(model, criteria.collection(model.alias()), 0, 0);
        if let Some(field) = injected {
            query.filters.push(QueryFilter {
                field: field.to_string(),
                operator: FilterOperator::In,
                value: FilterValue::List(Vec::new()),
            });
        }
        query.validate()?;
        driver.validate(&query)?;

        for child in model.children() {
            let foreign_key = match model.schema().relation(&child.relation).map(|r| &r.kind) {
                Some(RelationKind::Join { foreign_key, .. }) => Some(foreign_key.as_str()),
                _ => None,
            };
            self.prepare_node(&child.model, criteria, foreign_key)?;
        }
        Ok(())
    }

    /// Build the query for one model node.
    fn build_query(
        &self,
        model: &Model,
        criteria: Option<&CollectionCriteria>,
        offset: u64,
        limit: u64,
    ) -> Query {
        let mut query = Query::new(model.schema().clone(), model.view(), model.alias());
        query.offset = offset;
        query.limit = limit;
        if let Some(criteria) = criteria {
            query.filters = criteria.filters.clone();
            query.sorts = criteria.sorts.clone();
            query.aggregations = criteria.aggregations.clone();
            query.options = criteria.options.clone();
        }
        query
    }

    /// Validate and dispatch one query to its driver.
    async fn run(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
    ) -> EngineResult<QueryResult> {
        query.validate()?;
        let driver = self.driver(query.schema.source_type())?;

        let supported = driver.supported_options();
        for key in query.options.keys() {
            if !supported.iter().any(|s| *s == key) {
                tracing::warn!(
                    option = %key,
                    source_type = %query.schema.source_type(),
                    "option not supported by driver, ignoring"
                );
            }
        }

        driver.search(query, scroll, self.builder.as_ref()).await
    }

    /// Fetch one root page and resolve its relations.
    async fn execute_page(
        &self,
        model: &Model,
        criteria: &QueryCriteria,
        offset: u64,
        limit: u64,
        scroll: Option<&mut ScrollContext>,
    ) -> EngineResult<QueryResult> {
        let root = criteria.collection(model.alias());
        let query = self.build_query(model, root, offset, limit);

        let mut result = self.run(&query, scroll).await?;
        self.resolve_children(model, criteria, &mut result).await?;
        Ok(result)
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .field("drivers", &tags)
            .finish()
    }
}

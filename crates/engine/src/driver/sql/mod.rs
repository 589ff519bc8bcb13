//! PostgreSQL driver.
//!
//! Statements are rendered by [`SqlQueryBuilder`] and executed inside a
//! transaction carrying a `SET LOCAL statement_timeout`. Rows come back as
//! JSON through `row_to_json`.

mod query_builder;

pub use query_builder::SqlQueryBuilder;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::Driver;
use crate::error::{EngineError, EngineResult};
use crate::query::{Query, ScrollContext};
use crate::result::{Aggregations, FacetBucket, QueryResult, RawRow, ResultBuilder};

const BACKEND: &str = "postgres";

/// Options read by [`SqlDriver`].
pub const SUPPORTED_OPTIONS: &[&str] = &["max_query_time"];

/// Driver over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct SqlDriver {
    pool: PgPool,
    statement_timeout: Duration,
}

impl SqlDriver {
    /// Default statement timeout (default: 10 seconds).
    pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Self::DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Statement timeout for `query`: the `max_query_time` option in seconds
    /// when set and positive, else the driver default.
    fn timeout_for(&self, query: &Query) -> EngineResult<Duration> {
        match query.options.integer("max_query_time")? {
            Some(seconds) if seconds < 0 => Err(EngineError::DriverConfiguration(
                "invalid query timeout".into(),
            )),
            Some(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds.unsigned_abs())),
            _ => Ok(self.statement_timeout),
        }
    }
}

#[async_trait]
impl Driver for SqlDriver {
    fn supported_options(&self) -> &[&'static str] {
        SUPPORTED_OPTIONS
    }

    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        query.validate()?;
        let timeout = self.timeout_for(query)?;

        let sql = SqlQueryBuilder::new(query);
        let count_sql = sql.build_count();
        let main_sql = sql.build();
        let facet_sql: Vec<(String, String)> = query
            .aggregations
            .iter()
            .map(|a| (a.field.clone(), sql.build_facet(a)))
            .collect();

        tracing::debug!(
            table = %query.schema.source_name(),
            sql = %main_sql,
            offset = query.offset,
            limit = query.limit,
            "running SQL query"
        );

        let mut tx = self.pool.begin().await.map_err(EngineError::backend(BACKEND))?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(EngineError::backend(BACKEND))?;

        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(EngineError::backend(BACKEND))?;

        let rows: Vec<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({main_sql}) t"))
                .fetch_all(&mut *tx)
                .await
                .map_err(EngineError::backend(BACKEND))?;

        let mut facets = Vec::with_capacity(facet_sql.len());
        for (field, statement) in &facet_sql {
            let buckets: Vec<serde_json::Value> =
                sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({statement}) t"))
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(EngineError::backend(BACKEND))?;
            facets.push((field, buckets));
        }

        tx.commit().await.map_err(EngineError::backend(BACKEND))?;

        let rows = rows.into_iter().map(RawRow::Json).collect();
        let mut result = builder.build(rows, query);
        result.count = total.max(0) as u64;

        if !facets.is_empty() {
            let mut aggregations = Aggregations::default();
            for (field, buckets) in facets {
                let buckets = buckets
                    .iter()
                    .map(|row| {
                        let name = row.get(field.as_str()).unwrap_or(&serde_json::Value::Null);
                        let count = row
                            .get("count")
                            .and_then(serde_json::Value::as_u64)
                            .ok_or_else(|| {
                                EngineError::upstream(BACKEND, "facet row without a numeric count")
                            })?;
                        Ok(FacetBucket {
                            name: query.schema.value_from_json(field, name),
                            count,
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                aggregations.facets.insert(field.clone(), buckets);
            }
            result.aggregations = Some(aggregations);
        }

        if let Some(ctx) = scroll {
            ctx.advance(query.limit, result.count);
        }
        Ok(result)
    }
}

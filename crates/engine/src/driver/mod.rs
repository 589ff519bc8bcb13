//! Backend drivers.
//!
//! This module provides:
//! - Driver: the contract every backend implements
//! - InMemoryDriver / FlatFileDriver: in-process evaluation over tables and files
//! - SearchIndexDriver: RediSearch query-language translation
//! - HttpDriver: HTTP data sources with emulated paging
//! - SqlDriver: PostgreSQL through sea-query and sqlx

mod flat_file;
pub mod http;
mod memory;
pub mod search_index;
pub mod sql;

pub use flat_file::FlatFileDriver;
pub use memory::{Evaluation, InMemoryDriver, compare_values, evaluate, matches_filter};

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::query::{Query, ScrollContext};
use crate::result::{QueryResult, ResultBuilder};

/// A storage backend.
///
/// Implementations realize filtering, sorting, pagination and aggregation in
/// their own way; the result shape returned to the engine is uniform.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Option names this driver reads from the option bag. Used for
    /// diagnostics only.
    fn supported_options(&self) -> &[&'static str] {
        &[]
    }

    /// Backend-specific checks on `query`. The engine calls this for every
    /// node of a model tree before the first request is sent.
    fn validate(&self, _query: &Query) -> EngineResult<()> {
        Ok(())
    }

    /// Execute one page of `query`.
    ///
    /// When `scroll` is given the driver records its progress there and
    /// stops the context once the backend is drained.
    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult>;
}

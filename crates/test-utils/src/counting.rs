//! Driver wrapper that records every call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use raccolta_engine::driver::Driver;
use raccolta_engine::error::EngineResult;
use raccolta_engine::query::{Query, QueryFilter, ScrollContext};
use raccolta_engine::result::{QueryResult, ResultBuilder};

/// What a [`CountingDriver`] saw for one call.
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub alias: String,
    pub filters: Vec<QueryFilter>,
    pub offset: u64,
    pub limit: u64,
}

/// Wraps a driver and records each `search` call.
#[derive(Clone)]
pub struct CountingDriver {
    inner: Arc<dyn Driver>,
    calls: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<RecordedQuery>>>,
}

impl CountingDriver {
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of `search` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls made for `alias`, in order.
    pub fn calls_for(&self, alias: &str) -> Vec<RecordedQuery> {
        self.recorded()
            .into_iter()
            .filter(|q| q.alias == alias)
            .collect()
    }

    pub fn recorded(&self) -> Vec<RecordedQuery> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Driver for CountingDriver {
    fn supported_options(&self) -> &[&'static str] {
        self.inner.supported_options()
    }

    fn validate(&self, query: &Query) -> EngineResult<()> {
        self.inner.validate(query)
    }

    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedQuery {
                alias: query.alias.clone(),
                filters: query.filters.clone(),
                offset: query.offset,
                limit: query.limit,
            });
        self.inner.search(query, scroll, builder).await
    }
}

//! Scripted search index.
//!
//! Queries are not interpreted: searches page through a fixed document
//! list and aggregates return fixed rows. Every request is recorded so
//! tests can assert on the compiled query text.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use raccolta_engine::driver::search_index::{
    AggregateRequest, SearchIndexClient, SearchReply, SearchRequest,
};
use raccolta_engine::error::EngineResult;

type Document = Vec<(String, String)>;

#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    documents: Vec<Document>,
    facets: HashMap<String, Vec<Document>>,
    searches: Mutex<Vec<SearchRequest>>,
    aggregates: Mutex<Vec<AggregateRequest>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document given as field/value pairs.
    pub fn with_document(mut self, fields: &[(&str, &str)]) -> Self {
        self.documents.push(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Fixed aggregate rows for `field`, as `(value, count)` pairs.
    pub fn with_facet(mut self, field: &str, buckets: &[(&str, u64)]) -> Self {
        let rows = buckets
            .iter()
            .map(|(value, count)| {
                vec![
                    (field.to_string(), value.to_string()),
                    ("count".to_string(), count.to_string()),
                ]
            })
            .collect();
        self.facets.insert(field.to_string(), rows);
        self
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn aggregates(&self) -> Vec<AggregateRequest> {
        self.aggregates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SearchIndexClient for MemorySearchIndex {
    async fn search(&self, request: SearchRequest) -> EngineResult<SearchReply> {
        let take = if request.limit == 0 {
            usize::MAX
        } else {
            request.limit as usize
        };
        let documents = self
            .documents
            .iter()
            .skip(request.offset as usize)
            .take(take)
            .cloned()
            .collect();
        self.searches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        Ok(SearchReply {
            total: self.documents.len() as u64,
            documents,
        })
    }

    async fn aggregate(&self, request: AggregateRequest) -> EngineResult<Vec<Document>> {
        let rows = self.facets.get(&request.field).cloned().unwrap_or_default();
        let rows = rows
            .into_iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .collect();
        self.aggregates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        Ok(rows)
    }
}

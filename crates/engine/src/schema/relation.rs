//! Relations between schemas.
//!
//! A relation is either a foreign-key join, resolved by the engine, or a
//! custom resolver for edges that are not a single key equality (for
//! example a delimited list of foreign keys stored on the parent row).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::FilterValue;
use crate::result::QueryResult;

/// How many related rows attach to one parent row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn is_collection(self) -> bool {
        self == Cardinality::Many
    }
}

/// Filter produced by [`RelationResolver::extract`]: the related query gets
/// `field IN values`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationKeys {
    pub field: String,
    pub values: Vec<FilterValue>,
}

impl RelationKeys {
    pub fn new(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Caller-supplied extract/resolve pair for a custom relation.
pub trait RelationResolver: Send + Sync {
    /// Derive the IN filter for the related query from the parent page.
    fn extract(&self, parents: &QueryResult) -> RelationKeys;

    /// Attach related rows onto parent rows under `alias`.
    ///
    /// Parents with no related rows should be left untouched.
    fn resolve(
        &self,
        parents: &mut QueryResult,
        related: &QueryResult,
        cardinality: Cardinality,
        alias: &str,
    );
}

/// How a relation is resolved.
#[derive(Clone)]
pub enum RelationKind {
    /// `parent.local_key == related.foreign_key`.
    Join {
        local_key: String,
        foreign_key: String,
    },
    /// Custom extract/resolve pair.
    Resolver(Arc<dyn RelationResolver>),
}

impl fmt::Debug for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Join {
                local_key,
                foreign_key,
            } => f
                .debug_struct("Join")
                .field("local_key", local_key)
                .field("foreign_key", foreign_key)
                .finish(),
            RelationKind::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Named edge from one schema to another.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Relation name, unique per schema. Also the default alias of the
    /// related collection.
    pub name: String,

    /// Name of the target schema.
    pub target: String,

    pub kind: RelationKind,

    pub cardinality: Cardinality,
}

impl Relation {
    /// Foreign-key join relation.
    pub fn join(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::Join {
                local_key: local_key.into(),
                foreign_key: foreign_key.into(),
            },
            cardinality,
        }
    }

    /// Custom resolver relation.
    pub fn resolver(
        name: impl Into<String>,
        target: impl Into<String>,
        resolver: Arc<dyn RelationResolver>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::Resolver(resolver),
            cardinality,
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, RelationKind::Join { .. })
    }
}

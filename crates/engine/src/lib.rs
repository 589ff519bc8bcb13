//! Raccolta query engine.
//!
//! One declarative query surface over heterogeneous backends: a model tree
//! (schema, view, alias and related children) plus per-alias criteria is
//! dispatched to the driver registered for each schema's source type, and
//! related rows are stitched onto their parents in process.
//!
//! Drivers shipped with the crate:
//! - `sql`: PostgreSQL through sea-query and sqlx
//! - `search_index`: RediSearch through redis
//! - `http`: JSON/HTML endpoints through reqwest
//! - `flat_file` and `memory`: CSV/JSON-lines files and in-process tables

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod model;
pub mod query;
pub mod result;
pub mod schema;

pub use config::{EmptyRelationPolicy, EngineConfig};
pub use driver::Driver;
pub use engine::QueryEngine;
pub use error::{EngineError, EngineResult};
pub use model::Model;
pub use query::{
    Aggregation, CollectionCriteria, FilterOperator, FilterValue, Query, QueryCriteria,
    ScrollContext, SortDirection,
};
pub use result::{Entity, QueryResult, ResultBuilder};
pub use schema::{Cardinality, FieldType, Relation, RelationResolver, Schema, Value};

//! Request model.
//!
//! This module provides:
//! - QueryCriteria / CollectionCriteria: caller-side request keyed by alias
//! - Query: concrete per-node request handed to drivers
//! - FilterOperator, FilterValue, QuerySort, Aggregation: request primitives
//! - OptionBag: backend-specific options
//! - ScrollContext: per-session scroll state

mod criteria;
mod options;
#[allow(clippy::module_inception)]
mod query;
mod scroll;
pub mod types;

pub use criteria::{CollectionCriteria, QueryCriteria};
pub use options::{HtmlFormatter, JsonFormatter, OptionBag, OptionValue, UrlGenerator};
pub use query::Query;
pub use scroll::ScrollContext;
pub use types::{
    Aggregation, AggregationKind, DEFAULT_FACET_LIMIT, FilterOperator, FilterValue, QueryFilter,
    QuerySort, SortDirection,
};

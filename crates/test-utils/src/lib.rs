//! Raccolta test utilities.
//!
//! Helpers for integration testing: schema fixtures and datasets, a
//! counting driver wrapper, and scripted stand-ins for the search index and
//! HTTP transports.

mod counting;
mod fixtures;
mod search_index;
mod transport;

pub use counting::{CountingDriver, RecordedQuery};
pub use fixtures::{
    ProductIdsResolver, address_rows, address_schema, memory_driver, order_rows, order_schema,
    post_rows, post_schema, product_rows, product_schema, user_rows, user_schema,
};
pub use search_index::MemorySearchIndex;
pub use transport::ScriptedTransport;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

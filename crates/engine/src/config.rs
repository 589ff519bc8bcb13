//! Engine configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result, bail};

/// Default number of root rows per page (default: 10).
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Upper bound for a root page (default: 100).
pub const MAX_PAGE_SIZE: u64 = 100;

/// Default batch size for related-collection queries (default: 1000).
pub const RELATION_FETCH_LIMIT: u64 = 1000;

/// What to attach when a collection relation finds no related rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyRelationPolicy {
    /// Leave the parent row untouched (no key under the alias).
    #[default]
    Skip,
    /// Attach an empty collection for collection-cardinality relations.
    EmptyCollection,
}

/// Query engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size used when the criteria carry no limit.
    pub default_page_size: u64,

    /// Root pages are capped to this size.
    pub max_page_size: u64,

    /// Limit applied to related queries without an explicit limit.
    pub relation_fetch_limit: u64,

    /// Behavior for unmatched collection relations.
    pub empty_relation_policy: EmptyRelationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            relation_fetch_limit: RELATION_FETCH_LIMIT,
            empty_relation_policy: EmptyRelationPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let default_page_size = env::var("RACCOLTA_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("RACCOLTA_DEFAULT_PAGE_SIZE must be a valid u64")?;

        let max_page_size = env::var("RACCOLTA_MAX_PAGE_SIZE")
            .unwrap_or_else(|_| MAX_PAGE_SIZE.to_string())
            .parse()
            .context("RACCOLTA_MAX_PAGE_SIZE must be a valid u64")?;

        let relation_fetch_limit = env::var("RACCOLTA_RELATION_FETCH_LIMIT")
            .unwrap_or_else(|_| RELATION_FETCH_LIMIT.to_string())
            .parse()
            .context("RACCOLTA_RELATION_FETCH_LIMIT must be a valid u64")?;

        let empty_relation_policy = match env::var("RACCOLTA_EMPTY_RELATIONS")
            .unwrap_or_else(|_| "skip".to_string())
            .to_lowercase()
            .as_str()
        {
            "skip" => EmptyRelationPolicy::Skip,
            "empty_collection" => EmptyRelationPolicy::EmptyCollection,
            other => bail!(
                "RACCOLTA_EMPTY_RELATIONS must be 'skip' or 'empty_collection', got '{other}'"
            ),
        };

        let config = Self {
            default_page_size,
            max_page_size,
            relation_fetch_limit,
            empty_relation_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would produce unbounded or empty pages.
    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            bail!("page sizes must be greater than zero");
        }
        if self.relation_fetch_limit == 0 {
            bail!("relation fetch limit must be greater than zero");
        }
        Ok(())
    }

    /// Resolve the page size for a root query, capping oversized requests.
    /// A requested size of zero falls back to the default.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        let size = requested
            .filter(|&size| size > 0)
            .unwrap_or(self.default_page_size);
        if size > self.max_page_size {
            tracing::warn!(
                requested = size,
                capped = self.max_page_size,
                "page size exceeds maximum, capping"
            );
            return self.max_page_size;
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = EngineConfig::default();
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.empty_relation_policy, EmptyRelationPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn page_size_is_capped() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size(None), 10);
        assert_eq!(config.page_size(Some(25)), 25);
        assert_eq!(config.page_size(Some(5_000)), 100);
    }

    #[test]
    fn zero_requested_page_size_uses_default() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size(Some(0)), 10);
    }

    #[test]
    fn zero_page_size_rejected() {
        let config = EngineConfig {
            default_page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

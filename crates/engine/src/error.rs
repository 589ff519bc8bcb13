//! Engine error types.
//!
//! Every fatal failure reaches the caller of `query`/`scroll` unchanged.
//! Relation gaps are not errors and have no variant here.

use thiserror::Error;

/// Boxed transport error carried by [`EngineError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building, validating or executing a query.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A filter, sort or aggregation references a field that is undeclared,
    /// not filterable, or of the wrong type for the operation.
    #[error("schema violation on field '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// The selected driver does not implement the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Driver configuration is missing or malformed. Raised before any I/O.
    #[error("driver configuration error: {0}")]
    DriverConfiguration(String),

    /// The backend answered but the payload could not be interpreted.
    #[error("{backend}: malformed upstream response: {message}")]
    UpstreamResponse {
        backend: &'static str,
        message: String,
    },

    /// No driver is registered for a schema's source type.
    #[error("no driver registered for source type '{0}'")]
    DriverNotRegistered(String),

    /// The model tree is inconsistent with its schemas.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Transport-level failure inside a driver (network, file, database).
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    /// Create a schema violation naming the offending field.
    pub fn schema_violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an upstream response error carrying the backend's diagnostic.
    pub fn upstream(backend: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamResponse {
            backend,
            message: message.into(),
        }
    }

    /// Returns a closure wrapping transport errors for `map_err`.
    pub fn backend<E>(backend: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| Self::Backend {
            backend,
            source: Box::new(source),
        }
    }

    /// Whether this error was raised by validation rather than by a backend.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

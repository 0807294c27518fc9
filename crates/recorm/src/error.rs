//! Error types for recorm

use thiserror::Error;

/// Result type alias for recorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Boxed error returned by adapters that don't map onto a dedicated variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Builder or connection misconfiguration (no table, unknown connection name, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error raised by an adapter while executing a statement
    #[error("Adapter error: {0}")]
    Adapter(#[source] BoxError),

    /// Query execution error from tokio-postgres
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found (only raised by the `*_or_fail` helpers)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap an adapter-level error without altering it
    pub fn adapter(err: impl Into<BoxError>) -> Self {
        Self::Adapter(err.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error came from the adapter
    pub fn is_adapter(&self) -> bool {
        match self {
            Self::Adapter(_) => true,
            #[cfg(feature = "postgres")]
            Self::Query(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

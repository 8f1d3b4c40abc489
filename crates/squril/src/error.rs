//! Error types for squril.

/// Library-facing error type for every squril operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SqurilError {
    /// A URI query failed to lex or parse.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// Restore found more than one row matching a primary-key value.
    #[error("data integrity error: {reason}")]
    DataIntegrity { reason: String },

    /// An operation was attempted against an audit table, or some other
    /// operation the public API refuses regardless of caller intent.
    #[error("operation not permitted: {reason}")]
    OperationNotPermitted { reason: String },

    /// The embedded (SQLite) backend reported a failure.
    #[error("embedded backend error: {0}")]
    Embedded(#[from] rusqlite::Error),

    /// The server (PostgreSQL) backend reported a failure.
    #[error("server backend error: {0}")]
    Server(#[from] postgres::Error),

    /// A connection could not be checked out of the server pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A document failed to serialize or deserialize as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SqurilError {
    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn data_integrity(reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn operation_not_permitted(reason: impl Into<String>) -> Self {
        Self::OperationNotPermitted {
            reason: reason.into(),
        }
    }
}

/// Result type alias for squril operations.
pub type SqurilResult<T> = std::result::Result<T, SqurilError>;

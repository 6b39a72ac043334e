use std::fmt;

/// Result type for engram-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the persistence layer
#[derive(Debug)]
pub enum Error {
    /// Database operation failed
    Database(sqlx::Error),

    /// Upsert lost an insert race and the retry-as-update also failed
    Conflict(String),

    /// Write verification failed; the row cannot be trusted
    Fatal(String),

    /// Requested row does not exist
    NotFound(i64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "Database error: {}", err),
            Error::Conflict(msg) => write!(f, "Upsert conflict: {}", msg),
            Error::Fatal(msg) => write!(f, "Store verification failed: {}", msg),
            Error::NotFound(id) => write!(f, "No row with id {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Conflict(_) | Error::Fatal(_) | Error::NotFound(_) => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err)
    }
}

impl Error {
    /// Whether the underlying database error is a unique violation,
    /// i.e. an insert race another writer won.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err.as_database_error().and_then(|d| d.code()),
            Some(code) if code == "23505"
        )
    }
}

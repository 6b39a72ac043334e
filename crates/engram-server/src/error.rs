use std::fmt;

/// Result type for engram-server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can take the service down.
///
/// Only configuration and bind-time failures are fatal; per-request
/// failures are logged and the service continues.
#[derive(Debug)]
pub enum Error {
    /// Configuration missing or unparseable
    Config(String),

    /// Persistence layer failure during startup
    Store(engram_store::Error),

    /// Bind or serve failure
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(_) => None,
            Error::Store(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<engram_store::Error> for Error {
    fn from(err: engram_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

use std::fmt;

/// Result type for engram-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when calling the model endpoints
#[derive(Debug)]
pub enum Error {
    /// HTTP transport failure (includes client-side timeouts)
    Http(reqwest::Error),

    /// Endpoint answered with a non-success status
    Status(u16, String),

    /// Response body did not have the expected shape
    Malformed(String),

    /// Embedding came back with the wrong number of components
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Status(code, body) => write!(f, "model endpoint returned {}: {}", code, body),
            Error::Malformed(msg) => write!(f, "malformed model response: {}", msg),
            Error::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "embedding dimension mismatch: expected {}, got {}",
                    expected, actual
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

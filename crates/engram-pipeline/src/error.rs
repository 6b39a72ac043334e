use std::fmt;

/// Result type for engram-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while coordinating a capture
#[derive(Debug)]
pub enum Error {
    /// Extraction layer error (transcript unreadable)
    Extract(engram_extract::Error),

    /// Persistence layer error
    Store(engram_store::Error),

    /// Request carried neither an inline conversation nor a transcript
    MissingSource,

    /// Conversation resolved to zero messages; nothing to persist
    EmptyConversation,

    /// Transcript file read exceeded its time budget
    TranscriptTimeout,

    /// Ingestion queue is at capacity
    QueueFull,

    /// Pipeline is shutting down and no longer accepts work
    ShuttingDown,

    /// A blocking sub-task failed to complete
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Extract(err) => write!(f, "Extraction error: {}", err),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::MissingSource => {
                write!(f, "capture carries neither conversation_data nor transcript_path")
            }
            Error::EmptyConversation => write!(f, "conversation resolved to zero messages"),
            Error::TranscriptTimeout => write!(f, "transcript file read timed out"),
            Error::QueueFull => write!(f, "capture queue is full"),
            Error::ShuttingDown => write!(f, "pipeline is shutting down"),
            Error::Internal(msg) => write!(f, "internal pipeline error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Extract(err) => Some(err),
            Error::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<engram_extract::Error> for Error {
    fn from(err: engram_extract::Error) -> Self {
        Error::Extract(err)
    }
}

impl From<engram_store::Error> for Error {
    fn from(err: engram_store::Error) -> Self {
        Error::Store(err)
    }
}

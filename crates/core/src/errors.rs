use std::path::PathBuf;
use std::sync::Arc;

/// Result type alias for flightcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error shared between every waiter of a single flight
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type for flightcache operations
///
/// Every variant is cheap to clone: one failed flight hands the same error
/// to all of its collapsed callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid construction parameters or configuration input
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The authoritative source failed for a flight
    #[error("source load failed for '{identity}': {source}")]
    SourceLoad {
        identity: String,
        #[source]
        source: SharedError,
    },

    /// The caller stopped waiting before the flight resolved
    #[error("load for '{identity}' was cancelled")]
    Cancelled { identity: String },

    /// The shared execution panicked or was aborted before resolving
    #[error("load for '{identity}' aborted: {message}")]
    Aborted { identity: String, message: String },

    /// No async runtime was available to host background work
    #[error("runtime error: {message}")]
    Runtime { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: Arc::new(error),
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a source load error, taking ownership of the loader's error
    #[must_use]
    pub fn source_load<E>(identity: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::SourceLoad {
            identity: identity.into(),
            source: Arc::new(source),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(identity: impl Into<String>) -> Self {
        Error::Cancelled {
            identity: identity.into(),
        }
    }

    /// Create an aborted flight error
    #[must_use]
    pub fn aborted(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Aborted {
            identity: identity.into(),
            message: message.into(),
        }
    }

    /// Create a runtime error
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, operation: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation: operation.into(),
            source: Arc::new(source),
        }
    }

    /// The identity of the flight this error belongs to, if any
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Error::SourceLoad { identity, .. }
            | Error::Cancelled { identity }
            | Error::Aborted { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed without any change
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::Aborted { .. })
    }

    /// Whether this error should count against the error rate
    #[must_use]
    pub const fn counts_as_load_error(&self) -> bool {
        matches!(self, Error::SourceLoad { .. } | Error::Aborted { .. })
    }
}

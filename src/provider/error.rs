//! Provider error types
//!
//! All errors that can occur during provider operations are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// the main error type for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// the requested path was not found
    #[error("file not found: {0}")]
    NotFound(String),

    /// the path is malformed or escapes the storage root
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the provider was closed and no longer accepts mutations
    #[error("provider is closed")]
    Closed,

    /// no repository at the path and none may be created
    #[error("repository does not exist and cannot be created: {0}")]
    RepositoryUnavailable(PathBuf),

    /// cloning the remote failed for a reason other than an empty remote
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    /// authentication material could not be loaded
    #[error("credentials error: {0}")]
    Credentials(String),

    /// in-flight replication did not finish before the shutdown deadline
    #[error("timed out after {0:?} waiting for pending pushes")]
    ShutdownTimeout(Duration),

    /// the push executed during shutdown failed
    #[error("push to {remote} failed during shutdown: {message}")]
    FlushFailed { remote: String, message: String },

    /// object store backend failure
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// a background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

impl ProviderError {
    /// shorthand for an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound(_) => true,
            ProviderError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ProviderError::ShutdownTimeout(_) | ProviderError::FlushFailed { .. }
        )
    }
}

impl From<tokio::task::JoinError> for ProviderError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProviderError::Task(err.to_string())
    }
}

/// result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = ProviderError::NotFound("a.txt".to_string());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_retriable());

        let io = ProviderError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(io.is_not_found());

        let timeout = ProviderError::ShutdownTimeout(Duration::from_secs(30));
        assert!(!timeout.is_not_found());
        assert!(timeout.is_retriable());
    }

    #[test]
    fn test_invalid_path_message() {
        let err = ProviderError::invalid_path("../x", "escapes the storage root");
        assert_eq!(
            err.to_string(),
            "invalid path '../x': escapes the storage root"
        );
    }
}

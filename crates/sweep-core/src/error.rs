//! Error types for Sweep.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Batch spec validation errors
    #[error("Invalid batch spec: {0}")]
    Validation(String),

    #[error("malformed 'on' field; missing either a repository name or a query")]
    MalformedSelector,

    // Resolution errors
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Revision not found: {rev} in {repo}")]
    RevisionNotFound { repo: String, rev: String },

    #[error("no branch matching {branch:?} found for repository {repo}")]
    NoMatchingBranch { repo: String, branch: String },

    #[error("not a blob: {0:?}")]
    NotABlob(String),

    // Search errors
    #[error("Search error: {0}")]
    Search(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    // Job execution errors
    #[error("refusing to write outside of working directory: {0:?}")]
    PathTraversal(String),

    #[error("job exceeded maximum execution time of {0:?}")]
    JobTimeout(Duration),

    #[error("Step failed with exit code {exit_code}: {message}")]
    StepFailed { exit_code: i32, message: String },

    // Wrapping and aggregation
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{} errors occurred: {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Aggregate(Vec<Error>),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap this error with an operation-name context message.
    pub fn context(self, message: impl Into<String>) -> Error {
        Error::Context {
            context: message.into(),
            source: Box::new(self),
        }
    }

    /// Combine a list of errors into a single error.
    ///
    /// Returns `None` for an empty list and the error itself for a
    /// single-element list.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Aggregate(errors)),
        }
    }

    /// True if this error (or any aggregated member) is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::JobTimeout(_) => true,
            Error::Context { source, .. } => source.is_timeout(),
            Error::Aggregate(errors) => errors.iter().any(Error::is_timeout),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(Error::aggregate(vec![]).is_none());
    }

    #[test]
    fn test_aggregate_single_unwraps() {
        let err = Error::aggregate(vec![Error::Internal("boom".into())]).unwrap();
        assert_eq!(err.to_string(), "Internal error: boom");
    }

    #[test]
    fn test_aggregate_joins_messages() {
        let err = Error::aggregate(vec![
            Error::Internal("first".into()),
            Error::Internal("second".into()),
        ])
        .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("2 errors occurred"));
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_context_preserves_timeout() {
        let err = Error::JobTimeout(Duration::from_secs(1800)).context("failed to perform docker step");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("1800s"));
    }
}

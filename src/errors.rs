// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by the retrieval core, the record store and the
//! embedding providers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An external service was unreachable, timed out or rate limited the call.
    #[error("{service} unavailable: {message}")]
    TransientDependency {
        service: &'static str,
        message: String,
    },

    /// An external service answered, but the answer cannot be used.
    #[error("{service} failed: {message}")]
    Dependency {
        service: &'static str,
        message: String,
    },

    /// A stored vector could not be decoded or does not fit the corpus.
    #[error("Malformed vector on record {id}: {reason}")]
    MalformedVector { id: String, reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn transient(service: &'static str, message: impl Into<String>) -> Self {
        Error::TransientDependency {
            service,
            message: message.into(),
        }
    }

    pub(crate) fn dependency(service: &'static str, message: impl Into<String>) -> Self {
        Error::Dependency {
            service,
            message: message.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientDependency { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_dependency_errors_are_retryable() {
        assert!(Error::transient("embeddings", "429 Too Many Requests").is_transient());
        assert!(!Error::dependency("embeddings", "bad payload").is_transient());
        assert!(!Error::InvalidInput("empty".into()).is_transient());
        assert!(!Error::NotFound("abc".into()).is_transient());
    }

    #[test]
    fn messages_name_the_record() {
        let err = Error::MalformedVector {
            id: "r1".into(),
            reason: "blob length 7 is not a multiple of 4".into(),
        };
        assert!(err.to_string().contains("r1"));
    }
}

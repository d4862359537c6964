//! Domain error taxonomy.
//!
//! None of these are retried: each indicates a configuration or programming
//! defect, or a process group that can no longer be trusted.

use storage::{CommError, StorageError};
use thiserror::Error;

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Failure of a domain or bookkeeping operation.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Invalid setup (non-cubic box, bad cutoff or resolution, bad config).
    /// Fatal: setup aborts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A backend or caller produced data inconsistent with current counts.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A collective operation did not reach agreement across processes.
    /// Fatal for the whole run.
    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    /// An operation that needs a created domain was called before
    /// `create_domain`.
    #[error("domain not initialized: {0} requires create_domain first")]
    Uninitialized(&'static str),

    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ContractViolation { operation, details } => {
                Self::ContractViolation(format!("{operation}: {details}"))
            }
            StorageError::Communication(e) => Self::CommunicationFailure(e.to_string()),
        }
    }
}

impl From<CommError> for DomainError {
    fn from(err: CommError) -> Self {
        Self::CommunicationFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_onto_taxonomy() {
        let e: DomainError = StorageError::contract("permute", "bad").into();
        assert!(matches!(e, DomainError::ContractViolation(ref m) if m == "permute: bad"));

        let e: DomainError = StorageError::Communication(CommError::Poisoned).into();
        assert!(matches!(e, DomainError::CommunicationFailure(_)));
    }
}

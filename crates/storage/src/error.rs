//! Error types for storage backends and process-group communication.

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result alias for communicator operations.
pub type CommResult<T> = Result<T, CommError>;

/// Failure of a storage backend operation.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend was handed (or produced) data inconsistent with the
    /// current population counts.
    #[error("contract violation in {operation}: {details}")]
    ContractViolation {
        /// Backend operation that detected the violation
        operation: &'static str,
        /// Human-readable description
        details: String,
    },

    /// A collective exchange did not complete consistently.
    #[error("communication failure: {0}")]
    Communication(#[from] CommError),
}

impl StorageError {
    /// Shorthand for building a [`StorageError::ContractViolation`].
    pub fn contract(operation: &'static str, details: impl Into<String>) -> Self {
        Self::ContractViolation {
            operation,
            details: details.into(),
        }
    }
}

/// Failure of a collective operation across the process group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// An all-to-all exchange was given the wrong number of outgoing buffers.
    #[error("expected {expected} outgoing buffers (one per process), got {actual}")]
    BufferCountMismatch {
        /// Process count of the group
        expected: usize,
        /// Buffers supplied by the caller
        actual: usize,
    },

    /// A peer did not deposit its message before the exchange barrier.
    #[error("rank {rank} received no message from rank {from}")]
    MissingMessage {
        /// Receiving rank
        rank: usize,
        /// Sending rank
        from: usize,
    },

    /// A received payload could not be decoded.
    #[error("malformed payload from rank {from}: {len} bytes is not a whole number of records")]
    MalformedPayload {
        /// Sending rank
        from: usize,
        /// Payload length in bytes
        len: usize,
    },

    /// Processes disagree on a quantity that must match group-wide.
    #[error("processes disagree on {quantity}: expected {expected}, got {actual}")]
    Disagreement {
        /// What was being agreed on
        quantity: &'static str,
        /// Value this process expected
        expected: u64,
        /// Value the group produced
        actual: u64,
    },

    /// A peer panicked while holding shared exchange state.
    #[error("process group state poisoned by a panicked peer")]
    Poisoned,
}

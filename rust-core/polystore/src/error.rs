// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the Polystore adapter layer.
//
// One enum covers every failure an adapter, the factory or the hash driver
// can report: connection and configuration problems, strict decoding
// failures, backend I/O, and the aggregated outcome of a bulk operation
// whose workers did not all succeed.

use std::fmt;

use thiserror::Error;

/// Errors that can occur when interacting with a store adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// An operation was attempted before `connect()` or after `close()`.
    #[error("store '{0}' is not connected")]
    NotConnected(String),

    /// Input did not match the expected operation shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend driver reported a failure for an otherwise valid request.
    #[error("backend error: {0}")]
    Backend(String),

    /// A value could not be encoded for, or decoded from, the backend.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// One or more workers of a bulk operation failed.
    #[error(
        "{} of {} batches failed ({})",
        .failures.len(),
        .failures.len() + .succeeded,
        summarize(.failures)
    )]
    MultiError {
        /// Failed batches, ordered by batch index.
        failures: Vec<BatchFailure>,
        /// Number of batches that completed successfully.
        succeeded: usize,
    },

    /// The configuration named a store type that no adapter implements.
    #[error("unknown store type: {0}")]
    UnknownStoreType(String),

    /// Work was abandoned because the caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The adapter does not implement the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The store descriptor or its environment is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Failed batches, if this is an aggregated bulk error.
    pub fn failures(&self) -> &[BatchFailure] {
        match self {
            StorageError::MultiError { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// The failure of a single batch inside a bulk hash operation.
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based index of the batch in submission order.
    pub batch: usize,
    /// The error that stopped the batch's worker.
    pub error: StorageError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {}: {}", self.batch, self.error)
    }
}

fn summarize(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(BatchFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err = StorageError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_unknown_store_type_display() {
        let err = StorageError::UnknownStoreType("999".to_string());
        assert_eq!(err.to_string(), "unknown store type: 999");
    }

    #[test]
    fn test_not_connected_display() {
        let err = StorageError::NotConnected("redis".to_string());
        assert_eq!(err.to_string(), "store 'redis' is not connected");
    }

    #[test]
    fn test_multi_error_display_lists_every_failure() {
        let err = StorageError::MultiError {
            failures: vec![
                BatchFailure {
                    batch: 1,
                    error: StorageError::Backend("timeout".to_string()),
                },
                BatchFailure {
                    batch: 3,
                    error: StorageError::Cancelled,
                },
            ],
            succeeded: 2,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 of 4 batches failed"));
        assert!(msg.contains("batch 1: backend error: timeout"));
        assert!(msg.contains("batch 3: operation cancelled"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_failures_empty_for_other_variants() {
        assert!(StorageError::Cancelled.failures().is_empty());
    }

    #[test]
    fn test_serde_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::SerializationError(_)));
    }
}

// src/error.rs
//
// Error taxonomy shared by the resolver, the listing engine, the bucket policy
// and the download transfer.

use thiserror::Error;

/// Convenience alias used by the core operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Operation-level error type.
///
/// Every variant is surfaced to the caller as soon as it happens; nothing in the
/// core retries or recovers locally.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("malformed storage address '{address}': {reason}")]
    MalformedAddress { address: String, reason: String },

    #[error("invalid match pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("bucket '{0}' already exists and ifExists policy is set to ERROR")]
    BucketAlreadyExists(String),

    #[error("unable to find blob on bucket '{bucket}' with path '{path}'")]
    BlobNotFound { bucket: String, path: String },

    // Transport, auth and quota failures coming back from the backend
    #[error("storage connection error: {0:#}")]
    StorageConnection(anyhow::Error),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl TaskError {
    pub(crate) fn malformed(address: &str, reason: impl Into<String>) -> Self {
        TaskError::MalformedAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn blob_not_found(bucket: &str, path: &str) -> Self {
        TaskError::BlobNotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        }
    }
}

// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: object-storage tasks (create/resolve a bucket, list blobs,
// download a blob) over a pluggable storage connection.

// ===== Core =====
pub mod constants;
pub mod error;
pub mod config;
pub mod uri_utils;
pub mod object_store;

// Components
pub mod bucket;
pub mod listing;
pub mod download;

// Workflow steps and the host-runtime seam
pub mod context;
pub mod tasks;

// ===== Backends =====
pub mod file_store;

#[cfg(feature = "gcs")]
pub mod gcs_client;

// ===== Re-exports =====
pub use error::{TaskError, TaskResult};
pub use config::TaskConfig;
pub use uri_utils::{resolve_address, StorageAddress};
pub use object_store::{connection_for, BlobListRequest, BlobReader, RawBlob, StorageConnection};
pub use bucket::{resolve_bucket, Bucket, BucketResolution, BucketSpec, ExistencePolicy};
pub use listing::{list_blobs, BlobDescriptor, BlobFilter, ListingMode, ListingOptions};
pub use download::{download_blob, TransferResult};
pub use context::{Counter, ExecutionContext, LocalRunContext};
pub use tasks::{BucketOutput, CreateBucket, DownloadBlob, DownloadOutput, ListBlobs, ListOutput};
pub use file_store::FileSystemConnection;

#[cfg(feature = "gcs")]
pub use gcs_client::GcsConnection;

// src/object_store.rs
//
// Pluggable storage-connection abstraction.
// The core only ever talks to a `StorageConnection`; backends live in
// file_store.rs (local directory tree) and gcs_client.rs (Google Cloud Storage).

use std::pin::Pin;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::bucket::{Bucket, BucketSpec};
use crate::config::TaskConfig;
use crate::constants::{SCHEME_GCS, SCHEME_GCS_ALT};
use crate::file_store::FileSystemConnection;
use crate::uri_utils::infer_scheme_from_uri;

/// Streaming read channel over a remote object.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// One record as returned by a backend listing or metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBlob {
    pub name: String,
    pub size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub generation: Option<i64>,
    /// Set by the backend for synthetic prefix entries of a delimited listing.
    pub is_directory: bool,
}

impl RawBlob {
    /// Synthetic "directory" entry produced by a delimited listing.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            ..Default::default()
        }
    }
}

/// Native listing request. `None` fields are left to the backend default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobListRequest {
    pub prefix: Option<String>,
    pub versions: Option<bool>,
    pub delimiter: Option<String>,
}

/// Pre-authenticated connection to an object-storage service.
///
/// Implementations must return the complete result set from `list_blobs`
/// (every page consumed) in the order the service yields it.
#[async_trait]
pub trait StorageConnection: Send + Sync {
    /// Fetch bucket state by name, `None` when the bucket does not exist.
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>>;

    /// Create a bucket from the desired state.
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<Bucket>;

    /// Apply the desired state to an existing bucket.
    async fn update_bucket(&self, spec: &BucketSpec) -> Result<Bucket>;

    /// List blobs of a bucket.
    async fn list_blobs(&self, bucket: &str, request: &BlobListRequest) -> Result<Vec<RawBlob>>;

    /// Blob metadata, `None` when no object exists at that name.
    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<RawBlob>>;

    /// Open a streaming read channel over the object's bytes.
    async fn open_read(&self, bucket: &str, name: &str) -> Result<BlobReader>;
}

#[async_trait]
impl<T: StorageConnection + ?Sized> StorageConnection for Arc<T> {
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        (**self).get_bucket(name).await
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        (**self).create_bucket(spec).await
    }

    async fn update_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        (**self).update_bucket(spec).await
    }

    async fn list_blobs(&self, bucket: &str, request: &BlobListRequest) -> Result<Vec<RawBlob>> {
        (**self).list_blobs(bucket, request).await
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<RawBlob>> {
        (**self).get_blob(bucket, name).await
    }

    async fn open_read(&self, bucket: &str, name: &str) -> Result<BlobReader> {
        (**self).open_read(bucket, name).await
    }
}

/// Backend families the factory knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Gcs,
    Unknown,
}

/// Best-effort scheme inference from an address.
pub fn infer_scheme(uri: &str) -> Scheme {
    match infer_scheme_from_uri(uri) {
        Ok(s) if s == SCHEME_GCS || s == SCHEME_GCS_ALT => Scheme::Gcs,
        _ => Scheme::Unknown,
    }
}

/// Convenience factory that picks a backend for an address.
///
/// A configured filesystem root wins over the address scheme, so a whole
/// workflow can be pointed at a local tree without rewriting its addresses.
pub async fn connection_for(uri: &str, config: &TaskConfig) -> Result<Arc<dyn StorageConnection>> {
    if let Some(root) = &config.fs_root {
        return Ok(Arc::new(FileSystemConnection::new(root.clone())));
    }

    match infer_scheme(uri) {
        Scheme::Gcs => gcs_connection(config).await,
        Scheme::Unknown => bail!(
            "Unable to infer backend from URI: {uri}. Supported schemes: gs://, gcs:// (or set a filesystem root)"
        ),
    }
}

#[cfg(feature = "gcs")]
async fn gcs_connection(config: &TaskConfig) -> Result<Arc<dyn StorageConnection>> {
    let client = crate::gcs_client::GcsConnection::new(config).await?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "gcs"))]
async fn gcs_connection(_config: &TaskConfig) -> Result<Arc<dyn StorageConnection>> {
    bail!("Google Cloud Storage support is not compiled in; rebuild with `--features gcs`")
}

// src/tasks.rs
//
// The three workflow steps. Each one renders its inputs through the execution
// context, resolves addresses, calls into the core and returns a serialisable
// output. Errors surface as anyhow::Error wrapping a TaskError where the core
// produced it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bucket::{resolve_bucket_outcome, Bucket, BucketResolution, BucketSpec, ExistencePolicy};
use crate::constants::METRIC_LIST_SIZE;
use crate::context::{Counter, ExecutionContext};
use crate::download::download_blob;
use crate::listing::{list_blobs, BlobDescriptor, ListingOptions};
use crate::object_store::StorageConnection;
use crate::uri_utils::resolve_address;

// -----------------------------------------------------------------------------
// CreateBucket
// -----------------------------------------------------------------------------

/// Create a bucket or update it if it already exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucket {
    #[serde(flatten)]
    pub spec: BucketSpec,
    /// Policy to apply if a bucket already exists.
    #[serde(default)]
    pub if_exists: ExistencePolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketOutput {
    pub bucket: Bucket,
    pub outcome: BucketResolution,
}

impl CreateBucket {
    pub async fn run<X, C>(&self, ctx: &X, conn: &C) -> Result<BucketOutput>
    where
        X: ExecutionContext + ?Sized,
        C: StorageConnection + ?Sized,
    {
        let spec = self.render_spec(ctx)?;

        debug!("Creating bucket '{:?}' (ifExists={})", spec, self.if_exists);
        let (bucket, outcome) = resolve_bucket_outcome(conn, &spec, self.if_exists).await?;
        info!("Bucket '{}' resolved: {:?}", bucket.name, outcome);

        Ok(BucketOutput { bucket, outcome })
    }

    fn render_spec<X: ExecutionContext + ?Sized>(&self, ctx: &X) -> Result<BucketSpec> {
        let render_opt = |value: &Option<String>| value.as_deref().map(|v| ctx.render(v)).transpose();

        let labels = match &self.spec.labels {
            Some(labels) => Some(
                labels
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), ctx.render(v)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
            None => None,
        };

        Ok(BucketSpec {
            name: ctx.render(&self.spec.name)?,
            location: render_opt(&self.spec.location)?,
            storage_class: render_opt(&self.spec.storage_class)?,
            versioning_enabled: self.spec.versioning_enabled,
            requester_pays: self.spec.requester_pays,
            labels,
        })
    }
}

// -----------------------------------------------------------------------------
// ListBlobs
// -----------------------------------------------------------------------------

/// List blobs under an address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBlobs {
    pub from: String,
    #[serde(flatten)]
    pub options: ListingOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListOutput {
    pub blobs: Vec<BlobDescriptor>,
}

impl ListBlobs {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Default::default()
        }
    }

    pub async fn run<X, C>(&self, ctx: &X, conn: &C) -> Result<ListOutput>
    where
        X: ExecutionContext + ?Sized,
        C: StorageConnection + ?Sized,
    {
        let from = resolve_address(&ctx.render(&self.from)?)?;
        let mut options = self.options.clone();
        options.match_pattern = options
            .match_pattern
            .as_deref()
            .map(|p| ctx.render(p))
            .transpose()?;

        let blobs = list_blobs(conn, &from, &options).await?;

        ctx.metric(Counter::of(METRIC_LIST_SIZE, blobs.len() as f64));
        debug!("Found '{}' blobs from '{}'", blobs.len(), from);

        Ok(ListOutput { blobs })
    }
}

// -----------------------------------------------------------------------------
// DownloadBlob
// -----------------------------------------------------------------------------

/// Download a blob and promote it as an artifact of the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBlob {
    pub from: String,
    /// Where the temp file is allocated; the system temp dir when unset.
    #[serde(skip)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutput {
    /// The bucket of the downloaded file
    pub bucket: String,
    /// The path on the bucket of the downloaded file
    pub path: String,
    pub size_bytes: u64,
    /// Where the runtime stored the downloaded file
    pub uri: String,
}

impl DownloadBlob {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            temp_dir: None,
        }
    }

    pub async fn run<X, C>(&self, ctx: &X, conn: &C) -> Result<DownloadOutput>
    where
        X: ExecutionContext + ?Sized,
        C: StorageConnection + ?Sized,
    {
        let from = resolve_address(&ctx.render(&self.from)?)?;

        let transfer = download_blob(conn, &from, self.temp_dir.as_deref()).await?;
        debug!("Download from '{}'", from);

        let uri = ctx.put_temp_file(transfer.local_artifact).await?;

        Ok(DownloadOutput {
            bucket: transfer.bucket,
            path: transfer.path,
            size_bytes: transfer.size_bytes,
            uri,
        })
    }
}

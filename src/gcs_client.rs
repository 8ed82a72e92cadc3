// src/gcs_client.rs
//
// Google Cloud Storage connection using the gcloud-storage crate.
// Authentication follows Application Default Credentials (ADC); a custom
// endpoint (emulator / proxy) switches to anonymous access.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::buckets::get::GetBucketRequest;
use gcloud_storage::http::buckets::insert::{BucketCreationConfig, InsertBucketParam, InsertBucketRequest};
use gcloud_storage::http::buckets::patch::{BucketPatchConfig, PatchBucketRequest};
use gcloud_storage::http::buckets::{Billing, Bucket as GcsBucket, Versioning};
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::list::ListObjectsRequest;
use gcloud_storage::http::objects::Object;
use gcloud_storage::http::Error as GcsError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::bucket::{Bucket, BucketSpec};
use crate::config::TaskConfig;
use crate::object_store::{BlobListRequest, BlobReader, RawBlob, StorageConnection};

// Global cached GCS client - initialized once and reused across all operations
static GCS_CLIENT: OnceCell<Arc<Client>> = OnceCell::const_new();

/// StorageConnection backed by Google Cloud Storage.
pub struct GcsConnection {
    client: Arc<Client>,
    project_id: Option<String>,
}

impl GcsConnection {
    /// Create a connection, initialising the shared client on first use.
    ///
    /// The credentials are discovered from:
    /// - GOOGLE_APPLICATION_CREDENTIALS env var (loaded by dotenvy)
    /// - Metadata server (if running on GCP)
    /// - gcloud CLI credentials
    pub async fn new(config: &TaskConfig) -> Result<Self> {
        let endpoint = config.gcs_endpoint.clone();
        let client = GCS_CLIENT
            .get_or_try_init(|| async {
                let client_config = if let Some(endpoint) = endpoint {
                    info!("Using custom GCS endpoint: {}", endpoint);
                    ClientConfig {
                        storage_endpoint: endpoint,
                        ..ClientConfig::default()
                    }
                    .anonymous()
                } else {
                    debug!("Initializing GCS client with Application Default Credentials");
                    ClientConfig::default()
                        .with_auth()
                        .await
                        .map_err(|e| anyhow!("Failed to initialize GCS authentication: {}", e))?
                };

                info!("GCS client initialized successfully (cached for reuse)");
                Ok::<Arc<Client>, anyhow::Error>(Arc::new(Client::new(client_config)))
            })
            .await?;

        Ok(Self {
            client: Arc::clone(client),
            project_id: config.project_id.clone(),
        })
    }
}

fn is_not_found(err: &GcsError) -> bool {
    matches!(err, GcsError::Response(resp) if resp.code == 404)
}

fn bucket_from_gcs(bucket: GcsBucket) -> Bucket {
    Bucket {
        name: bucket.name,
        location: Some(bucket.location).filter(|l| !l.is_empty()),
        storage_class: Some(bucket.storage_class).filter(|s| !s.is_empty()),
        versioning_enabled: bucket.versioning.map(|v| v.enabled).unwrap_or(false),
        requester_pays: bucket.billing.map(|b| b.requester_pays).unwrap_or(false),
        labels: bucket.labels.unwrap_or_default().into_iter().collect(),
        created_at: bucket
            .time_created
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())),
        updated_at: bucket
            .updated
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())),
    }
}

fn raw_from_object(obj: Object) -> RawBlob {
    RawBlob {
        size: Some(obj.size.max(0) as u64),
        updated_at: obj
            .updated
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())),
        content_type: obj.content_type,
        generation: Some(obj.generation),
        is_directory: false,
        name: obj.name,
    }
}

fn labels_of(spec: &BucketSpec) -> Option<HashMap<String, String>> {
    spec.labels
        .as_ref()
        .map(|labels| labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[async_trait]
impl StorageConnection for GcsConnection {
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        debug!("GCS GET BUCKET: bucket={}", name);

        match self
            .client
            .get_bucket(&GetBucketRequest {
                bucket: name.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(bucket) => Ok(Some(bucket_from_gcs(bucket))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(anyhow!("GCS GET BUCKET failed for {}: {}", name, e)),
        }
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        debug!("GCS CREATE BUCKET: bucket={}", spec.name);

        let project = self
            .project_id
            .clone()
            .context("GOOGLE_CLOUD_PROJECT must be set to create a GCS bucket")?;

        let request = InsertBucketRequest {
            name: spec.name.clone(),
            param: InsertBucketParam {
                project,
                ..Default::default()
            },
            bucket: BucketCreationConfig {
                location: spec.location.clone().unwrap_or_else(|| "US".to_string()),
                storage_class: spec.storage_class.clone(),
                labels: labels_of(spec),
                versioning: spec.versioning_enabled.map(|enabled| Versioning { enabled }),
                billing: spec.requester_pays.map(|requester_pays| Billing { requester_pays }),
                ..Default::default()
            },
        };

        let bucket = self
            .client
            .insert_bucket(&request)
            .await
            .map_err(|e| anyhow!("GCS CREATE BUCKET failed for {}: {}", spec.name, e))?;

        debug!("GCS CREATE BUCKET success");
        Ok(bucket_from_gcs(bucket))
    }

    async fn update_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        debug!("GCS UPDATE BUCKET: bucket={}", spec.name);

        let request = PatchBucketRequest {
            bucket: spec.name.clone(),
            metadata: Some(BucketPatchConfig {
                storage_class: spec.storage_class.clone(),
                labels: labels_of(spec),
                versioning: spec.versioning_enabled.map(|enabled| Versioning { enabled }),
                billing: spec.requester_pays.map(|requester_pays| Billing { requester_pays }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let bucket = self
            .client
            .patch_bucket(&request)
            .await
            .map_err(|e| anyhow!("GCS UPDATE BUCKET failed for {}: {}", spec.name, e))?;

        debug!("GCS UPDATE BUCKET success");
        Ok(bucket_from_gcs(bucket))
    }

    /// Follows `next_page_token` until every page has been consumed.
    async fn list_blobs(&self, bucket: &str, request: &BlobListRequest) -> Result<Vec<RawBlob>> {
        debug!("GCS LIST: bucket={}, request={:?}", bucket, request);

        let mut results = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: request.prefix.clone(),
                delimiter: request.delimiter.clone(),
                versions: request.versions,
                page_token: page_token.clone(),
                ..Default::default()
            };

            let response = self
                .client
                .list_objects(&page)
                .await
                .map_err(|e| anyhow!("GCS LIST failed for bucket {}: {}", bucket, e))?;

            // Files at this level first, then the collapsed sub-directories
            if let Some(items) = response.items {
                debug!("GCS LIST page received: {} objects", items.len());
                results.extend(items.into_iter().map(raw_from_object));
            }
            if let Some(prefixes) = response.prefixes {
                debug!("GCS LIST page received: {} prefixes", prefixes.len());
                results.extend(prefixes.into_iter().map(RawBlob::directory));
            }

            match response.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!("GCS LIST success: {} total results", results.len());
        Ok(results)
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<RawBlob>> {
        debug!("GCS STAT: bucket={}, object={}", bucket, name);

        match self
            .client
            .get_object(&GetObjectRequest {
                bucket: bucket.to_string(),
                object: name.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(obj) => Ok(Some(raw_from_object(obj))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(anyhow!("GCS STAT failed for gs://{}/{}: {}", bucket, name, e)),
        }
    }

    async fn open_read(&self, bucket: &str, name: &str) -> Result<BlobReader> {
        debug!("GCS OPEN READ: bucket={}, object={}", bucket, name);

        let stream = self
            .client
            .download_streamed_object(
                &GetObjectRequest {
                    bucket: bucket.to_string(),
                    object: name.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| anyhow!("GCS GET failed for gs://{}/{}: {}", bucket, name, e))?;

        // convert the stream's error type to std::io::Error for StreamReader
        let stream = stream.map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(StreamReader::new(Box::pin(stream))))
    }
}

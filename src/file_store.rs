// src/file_store.rs
//
// FileSystemConnection: a StorageConnection backed by a local directory tree.
// Useful for local runs of a workflow and for tests.
//
// Layout under the root:
// - `<root>/<bucket>/<object name>`   object bytes, `/` in names maps to sub-directories
// - `<root>/.buckets/<bucket>.json`   bucket metadata (labels, versioning, ...)

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

use crate::bucket::{Bucket, BucketSpec};
use crate::constants::{FS_BUCKET_META_DIR, FS_DEFAULT_LOCATION, FS_DEFAULT_STORAGE_CLASS};
use crate::object_store::{BlobListRequest, BlobReader, RawBlob, StorageConnection};

/// Filesystem adapter that implements StorageConnection for a local root directory.
///
/// Behaves like a single-version object store: the `versions` listing flag is
/// accepted and has no effect.
#[derive(Debug, Clone)]
pub struct FileSystemConnection {
    root: PathBuf,
}

impl FileSystemConnection {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty()
            || bucket.starts_with('.')
            || bucket.contains('/')
            || bucket.contains('\\')
        {
            bail!("Invalid bucket name for filesystem backend: '{}'", bucket);
        }
        Ok(self.root.join(bucket))
    }

    fn meta_path(&self, bucket: &str) -> PathBuf {
        self.root.join(FS_BUCKET_META_DIR).join(format!("{}.json", bucket))
    }

    /// Map an object name onto a path inside the bucket directory.
    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('/') {
            bail!("Invalid object name: '{}'", name);
        }
        if name.split('/').any(|seg| seg == "." || seg == "..") {
            bail!("Object name must not contain '.' or '..' segments: '{}'", name);
        }
        Ok(self.bucket_dir(bucket)?.join(name))
    }

    async fn read_meta(&self, bucket: &str) -> Result<Option<Bucket>> {
        let path = self.meta_path(bucket);
        match fs::read(&path).await {
            Ok(bytes) => {
                let meta = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt bucket metadata: {}", path.display()))?;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write_meta(&self, bucket: &Bucket) -> Result<()> {
        let path = self.meta_path(&bucket.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(bucket)?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Recursively collect `(object name, path)` pairs below `dir`.
    fn collect_objects<'a>(
        dir: &'a Path,
        prefix: String,
        results: &'a mut Vec<(String, PathBuf)>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let name = format!("{}{}", prefix, file_name);
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    Self::collect_objects(&entry.path(), format!("{}/", name), results).await?;
                } else if file_type.is_file() {
                    results.push((name, entry.path()));
                }
            }
            Ok(())
        })
    }

    async fn raw_from_path(name: String, path: &Path) -> Result<RawBlob> {
        let metadata = fs::metadata(path).await?;
        Ok(RawBlob {
            name,
            size: Some(metadata.len()),
            updated_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            content_type: None,
            generation: None,
            is_directory: false,
        })
    }
}

/// Split a sorted name list into objects and delimiter-collapsed prefixes.
fn delimit(names: Vec<String>, prefix: &str, delimiter: &str) -> (Vec<String>, Vec<String>) {
    let mut objects = Vec::new();
    let mut prefixes: Vec<String> = Vec::new();

    for name in names {
        let rest = &name[prefix.len()..];
        match rest.find(delimiter) {
            Some(idx) => {
                let dir = format!("{}{}", prefix, &rest[..idx + delimiter.len()]);
                // Names are sorted, so entries of one directory are contiguous
                if prefixes.last() != Some(&dir) {
                    prefixes.push(dir);
                }
            }
            None => objects.push(name),
        }
    }

    (objects, prefixes)
}

#[async_trait]
impl StorageConnection for FileSystemConnection {
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        let dir = self.bucket_dir(name)?;
        debug!("FS GET BUCKET: {}", dir.display());

        match fs::metadata(&dir).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", dir.display())),
        }

        // A bare directory without metadata is still a bucket
        Ok(Some(self.read_meta(name).await?.unwrap_or_else(|| Bucket {
            name: name.to_string(),
            location: Some(FS_DEFAULT_LOCATION.to_string()),
            storage_class: Some(FS_DEFAULT_STORAGE_CLASS.to_string()),
            ..Default::default()
        })))
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        let dir = self.bucket_dir(&spec.name)?;
        debug!("FS CREATE BUCKET: {}", dir.display());

        if fs::try_exists(&dir).await? {
            bail!("Bucket '{}' already exists", spec.name);
        }
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let now = Utc::now();
        let bucket = Bucket {
            name: spec.name.clone(),
            location: Some(
                spec.location
                    .clone()
                    .unwrap_or_else(|| FS_DEFAULT_LOCATION.to_string()),
            ),
            storage_class: Some(
                spec.storage_class
                    .clone()
                    .unwrap_or_else(|| FS_DEFAULT_STORAGE_CLASS.to_string()),
            ),
            versioning_enabled: spec.versioning_enabled.unwrap_or(false),
            requester_pays: spec.requester_pays.unwrap_or(false),
            labels: spec.labels.clone().unwrap_or_default(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.write_meta(&bucket).await?;
        Ok(bucket)
    }

    async fn update_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        debug!("FS UPDATE BUCKET: {}", spec.name);

        let mut bucket = self
            .get_bucket(&spec.name)
            .await?
            .ok_or_else(|| anyhow!("Bucket '{}' not found", spec.name))?;

        if let Some(location) = &spec.location {
            bucket.location = Some(location.clone());
        }
        if let Some(storage_class) = &spec.storage_class {
            bucket.storage_class = Some(storage_class.clone());
        }
        if let Some(enabled) = spec.versioning_enabled {
            bucket.versioning_enabled = enabled;
        }
        if let Some(requester_pays) = spec.requester_pays {
            bucket.requester_pays = requester_pays;
        }
        if let Some(labels) = &spec.labels {
            bucket.labels = labels.clone();
        }
        bucket.updated_at = Some(Utc::now());

        self.write_meta(&bucket).await?;
        Ok(bucket)
    }

    async fn list_blobs(&self, bucket: &str, request: &BlobListRequest) -> Result<Vec<RawBlob>> {
        let dir = self.bucket_dir(bucket)?;
        debug!("FS LIST: bucket={}, request={:?}", bucket, request);

        if !fs::try_exists(&dir).await? {
            bail!("Bucket '{}' not found", bucket);
        }

        let mut found = Vec::new();
        Self::collect_objects(&dir, String::new(), &mut found).await?;

        let prefix = request.prefix.as_deref().unwrap_or("");
        found.retain(|(name, _)| name.starts_with(prefix));
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let (object_names, prefixes) = match request.delimiter.as_deref() {
            Some(delimiter) => {
                let names = found.iter().map(|(name, _)| name.clone()).collect();
                delimit(names, prefix, delimiter)
            }
            None => (found.iter().map(|(name, _)| name.clone()).collect(), Vec::new()),
        };

        let mut results = Vec::with_capacity(object_names.len() + prefixes.len());
        for name in object_names {
            let path = dir.join(&name);
            trace!("FS LIST object: {}", name);
            results.push(Self::raw_from_path(name, &path).await?);
        }
        results.extend(prefixes.into_iter().map(RawBlob::directory));

        debug!("FS LIST success: {} results", results.len());
        Ok(results)
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<RawBlob>> {
        let path = self.object_path(bucket, name)?;
        debug!("FS STAT: {}", path.display());

        match fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(Some(Self::raw_from_path(name.to_string(), &path).await?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    async fn open_read(&self, bucket: &str, name: &str) -> Result<BlobReader> {
        let path = self.object_path(bucket, name)?;
        debug!("FS OPEN READ: {}", path.display());

        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::pin(file))
    }
}

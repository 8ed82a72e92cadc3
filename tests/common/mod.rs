// tests/common/mod.rs
//
// Common test utilities: an in-memory StorageConnection that counts calls and
// can be told to fail, plus output helpers shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use storage_tasks::{BlobListRequest, BlobReader, Bucket, BucketSpec, RawBlob, StorageConnection};

/// In-memory storage service.
///
/// `list_blobs` returns the configured listing verbatim, so tests control the
/// exact order the "service" yields.
#[derive(Default)]
pub struct MockConnection {
    buckets: Mutex<BTreeMap<String, Bucket>>,
    listing: Mutex<Vec<RawBlob>>,
    objects: Mutex<BTreeMap<String, Bytes>>,
    last_request: Mutex<Option<BlobListRequest>>,
    fail_with: Option<String>,
    fail_reads: bool,

    pub get_bucket_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub get_blob_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a connection error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Metadata lookups succeed but the byte stream breaks on the first read.
    pub fn with_broken_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn with_bucket(self, bucket: Bucket) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.name.clone(), bucket);
        self
    }

    pub fn with_listing(self, listing: Vec<RawBlob>) -> Self {
        *self.listing.lock().unwrap() = listing;
        self
    }

    pub fn with_object(self, bucket: &str, name: &str, data: impl Into<Bytes>) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, name), data.into());
        self
    }

    pub fn last_request(&self) -> Option<BlobListRequest> {
        self.last_request.lock().unwrap().clone()
    }

    /// Number of create + update calls, i.e. writes to the service.
    pub fn mutations(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.update_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        match &self.fail_with {
            Some(message) => bail!("{}", message),
            None => Ok(()),
        }
    }
}

fn bucket_from_spec(spec: &BucketSpec) -> Bucket {
    Bucket {
        name: spec.name.clone(),
        location: spec.location.clone(),
        storage_class: spec.storage_class.clone(),
        versioning_enabled: spec.versioning_enabled.unwrap_or(false),
        requester_pays: spec.requester_pays.unwrap_or(false),
        labels: spec.labels.clone().unwrap_or_default(),
        created_at: None,
        updated_at: None,
    }
}

#[async_trait]
impl StorageConnection for MockConnection {
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        self.get_bucket_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.buckets.lock().unwrap().get(name).cloned())
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let bucket = bucket_from_spec(spec);
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.name.clone(), bucket.clone());
        Ok(bucket)
    }

    async fn update_bucket(&self, spec: &BucketSpec) -> Result<Bucket> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let bucket = bucket_from_spec(spec);
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.name.clone(), bucket.clone());
        Ok(bucket)
    }

    async fn list_blobs(&self, _bucket: &str, request: &BlobListRequest) -> Result<Vec<RawBlob>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.check()?;
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<RawBlob>> {
        self.get_blob_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let objects = self.objects.lock().unwrap();
        Ok(objects.get(&format!("{}/{}", bucket, name)).map(|data| RawBlob {
            name: name.to_string(),
            size: Some(data.len() as u64),
            ..Default::default()
        }))
    }

    async fn open_read(&self, bucket: &str, name: &str) -> Result<BlobReader> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.fail_reads {
            return Ok(Box::pin(BrokenReader));
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, name))
            .cloned();
        match data {
            Some(data) => Ok(Box::pin(Cursor::new(data))),
            None => bail!("no such object: {}/{}", bucket, name),
        }
    }
}

/// Reader whose connection drops on the first read.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")))
    }
}

/// Print test header with formatting
pub fn print_test_header(test_name: &str, backend_name: &str) {
    println!("\n{}", "=".repeat(60));
    println!("TEST: {}", test_name);
    println!("Backend: {}", backend_name);
    println!("{}", "=".repeat(60));
}

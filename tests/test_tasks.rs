// tests/test_tasks.rs
//
// Workflow steps end to end through LocalRunContext: rendering, metrics,
// artifact promotion and bucket outputs.

mod common;

use anyhow::Result;
use common::MockConnection;
use std::sync::atomic::Ordering;
use storage_tasks::{
    BlobFilter, Bucket, BucketResolution, CreateBucket, Counter, DownloadBlob, ExistencePolicy,
    FileSystemConnection, ListBlobs, LocalRunContext, RawBlob, TaskError,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_list_renders_address_and_emits_size_metric() -> Result<()> {
    let conn = MockConnection::new().with_listing(vec![
        RawBlob { name: "dir/a.csv".into(), size: Some(1), ..Default::default() },
        RawBlob::directory("dir/sub/"),
        RawBlob { name: "dir/b.txt".into(), size: Some(2), ..Default::default() },
    ]);
    let ctx = LocalRunContext::new("unused")
        .with_variable("bucket", "my_bucket")
        .with_variable("ext", "csv");

    let mut task = ListBlobs::new("gs://{{ bucket }}/dir/");
    task.options.filter = BlobFilter::Files;
    task.options.match_pattern = Some(r".*\.{{ ext }}".to_string());

    let output = task.run(&ctx, &conn).await?;
    assert_eq!(output.blobs.len(), 1);
    assert_eq!(output.blobs[0].uri, "gs://my_bucket/dir/a.csv");

    let request = conn.last_request().expect("list was called");
    assert_eq!(request.prefix.as_deref(), Some("dir/"));

    assert_eq!(ctx.metrics(), vec![Counter::of("size", 1u32)]);
    Ok(())
}

#[tokio::test]
async fn test_list_unrenderable_address_makes_no_call() {
    let conn = MockConnection::new();
    let ctx = LocalRunContext::new("unused");

    let err = ListBlobs::new("gs://{{ missing }}/dir/").run(&ctx, &conn).await.unwrap_err();
    assert!(err.to_string().contains("missing"));
    assert_eq!(conn.list_calls.load(Ordering::SeqCst), 0);
    assert!(ctx.metrics().is_empty());
}

#[tokio::test]
async fn test_list_malformed_address() {
    let conn = MockConnection::new();
    let ctx = LocalRunContext::new("unused");

    let err = ListBlobs::new("not-an-address").run(&ctx, &conn).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TaskError>(),
        Some(TaskError::MalformedAddress { .. })
    ));
    assert_eq!(conn.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_download_promotes_artifact() -> Result<()> {
    let conn = MockConnection::new().with_object("my_bucket", "dir/file.csv", "a,b\n1,2\n");
    let scratch = TempDir::new()?;
    let artifacts = scratch.path().join("artifacts");
    let temp_dir = scratch.path().join("tmp");
    std::fs::create_dir_all(&temp_dir)?;

    let ctx = LocalRunContext::new(&artifacts).with_variable("file", "file.csv");
    let mut task = DownloadBlob::new("gs://my_bucket/dir/{{ file }}");
    task.temp_dir = Some(temp_dir.clone());

    let output = task.run(&ctx, &conn).await?;
    assert_eq!(output.bucket, "my_bucket");
    assert_eq!(output.path, "dir/file.csv");
    assert_eq!(output.size_bytes, 8);
    assert!(output.uri.starts_with("file://"));
    assert!(output.uri.ends_with(".csv"));

    let promoted: Vec<_> = std::fs::read_dir(&artifacts)?.collect::<std::io::Result<Vec<_>>>()?;
    assert_eq!(promoted.len(), 1);
    assert_eq!(std::fs::read(promoted[0].path())?, b"a,b\n1,2\n");
    assert_eq!(std::fs::read_dir(&temp_dir)?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_download_missing_blob_surfaces_not_found() {
    let conn = MockConnection::new();
    let ctx = LocalRunContext::new("unused");

    let err = DownloadBlob::new("gs://my_bucket/nope.csv").run(&ctx, &conn).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "unable to find blob on bucket 'my_bucket' with path 'nope.csv'"
    );
}

#[tokio::test]
async fn test_create_bucket_outputs() -> Result<()> {
    let ctx = LocalRunContext::new("unused").with_variable("env", "prod");
    let mut task = CreateBucket::default();
    task.spec.name = "data-{{ env }}".to_string();
    task.spec.versioning_enabled = Some(true);

    let conn = MockConnection::new();
    let output = task.run(&ctx, &conn).await?;
    assert_eq!(output.bucket.name, "data-prod");
    assert_eq!(output.outcome, BucketResolution::Created);

    let conn = MockConnection::new().with_bucket(Bucket {
        name: "data-prod".to_string(),
        ..Default::default()
    });
    task.if_exists = ExistencePolicy::Skip;
    let output = task.run(&ctx, &conn).await?;
    assert_eq!(output.outcome, BucketResolution::Skipped);
    assert!(!output.bucket.versioning_enabled);
    assert_eq!(conn.mutations(), 0);

    let json = serde_json::to_value(&output)?;
    assert_eq!(json["outcome"], "SKIPPED");
    assert_eq!(json["bucket"]["name"], "data-prod");
    Ok(())
}

#[tokio::test]
async fn test_create_then_list_on_filesystem_backend() -> Result<()> {
    let root = TempDir::new()?;
    let conn = FileSystemConnection::new(root.path());
    let ctx = LocalRunContext::new("unused");

    let task: CreateBucket = serde_json::from_str(r#"{"name":"my_bucket","location":"EU"}"#)?;
    let output = task.run(&ctx, &conn).await?;
    assert_eq!(output.bucket.location.as_deref(), Some("EU"));

    let err = task.run(&ctx, &conn).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TaskError>(),
        Some(TaskError::BucketAlreadyExists(_))
    ));

    std::fs::write(root.path().join("my_bucket/hello.txt"), b"hi")?;
    let output = ListBlobs::new("gs://my_bucket").run(&ctx, &conn).await?;
    assert_eq!(output.blobs.len(), 1);
    assert_eq!(output.blobs[0].uri, "gs://my_bucket/hello.txt");
    Ok(())
}

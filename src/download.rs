// src/download.rs
//
// Download transfer: stream one remote object into a freshly allocated local
// temp file and hand the file back as an opaque artifact handle.

use std::path::Path;

use anyhow::anyhow;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::constants::{DEFAULT_STREAM_BUFFER_SIZE, DOWNLOAD_TEMP_PREFIX};
use crate::error::{TaskError, TaskResult};
use crate::object_store::{BlobReader, StorageConnection};
use crate::uri_utils::StorageAddress;

/// Outcome of a download.
///
/// `local_artifact` owns the temp file: dropping it deletes the file, so the
/// runtime must promote it (see `ExecutionContext::put_temp_file`) to keep it.
#[derive(Debug)]
pub struct TransferResult {
    pub bucket: String,
    pub path: String,
    pub size_bytes: u64,
    pub local_artifact: TempPath,
}

/// Temp-file suffix carrying the extension of the remote object name.
///
/// Only the last path segment is considered; a name without a dot gets no suffix.
pub fn extension_suffix(name: &str) -> Option<String> {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(format!(".{}", ext)),
        _ => None,
    }
}

/// Download the object at `address` into a new temp file.
///
/// The temp file lives in `temp_dir` when given, the system temp dir otherwise.
/// Nothing is created locally when the blob does not exist.
pub async fn download_blob<C>(
    conn: &C,
    address: &StorageAddress,
    temp_dir: Option<&Path>,
) -> TaskResult<TransferResult>
where
    C: StorageConnection + ?Sized,
{
    let bucket = address.bucket();
    let path = address.path();

    if path.is_empty() {
        return Err(TaskError::blob_not_found(bucket, path));
    }

    let blob = conn
        .get_blob(bucket, path)
        .await
        .map_err(TaskError::StorageConnection)?
        .ok_or_else(|| TaskError::blob_not_found(bucket, path))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(DOWNLOAD_TEMP_PREFIX);
    let suffix = extension_suffix(path);
    if let Some(suffix) = &suffix {
        builder.suffix(suffix);
    }
    let temp = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    // From here on the TempPath removes the file if any step fails
    let (file, local_artifact) = temp.into_parts();

    let reader = conn
        .open_read(bucket, path)
        .await
        .map_err(TaskError::StorageConnection)?;
    let mut writer = tokio::fs::File::from_std(file);

    let size_bytes = transfer(reader, &mut writer, address).await?;
    writer.sync_all().await?;
    drop(writer);

    debug!(
        "Downloaded {} bytes (listed size {:?}) from '{}' to {}",
        size_bytes,
        blob.size,
        address,
        local_artifact.display()
    );

    Ok(TransferResult {
        bucket: bucket.to_string(),
        path: path.to_string(),
        size_bytes,
        local_artifact,
    })
}

// Read and write failures are reported separately: the former belong to the
// storage connection, the latter to the local filesystem.
async fn transfer(
    mut reader: BlobReader,
    writer: &mut tokio::fs::File,
    address: &StorageAddress,
) -> TaskResult<u64> {
    let mut buf = vec![0u8; DEFAULT_STREAM_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await.map_err(|e| {
            TaskError::StorageConnection(anyhow!(e).context(format!("read failed for {}", address)))
        })?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_suffix() {
        assert_eq!(extension_suffix("dir/file.csv").as_deref(), Some(".csv"));
        assert_eq!(extension_suffix("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_suffix("dir/README"), None);
        assert_eq!(extension_suffix("dir.d/file"), None);
        assert_eq!(extension_suffix("dir/file."), None);
        assert_eq!(extension_suffix("dir/.profile").as_deref(), Some(".profile"));
    }
}

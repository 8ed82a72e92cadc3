// src/constants.rs
//
// Centralized constants for storage-tasks to avoid hardcoded values throughout the codebase

/// Separator used between a scheme and the authority of a storage address
pub const SCHEME_SEPARATOR: &str = "://";

/// Google Cloud Storage schemes accepted by the backend factory
pub const SCHEME_GCS: &str = "gs";
pub const SCHEME_GCS_ALT: &str = "gcs";

/// Delimiter used for directory-style listings (one entry per immediate child)
pub const DEFAULT_DELIMITER: &str = "/";

/// Prefix of the temp file allocated for every download
pub const DOWNLOAD_TEMP_PREFIX: &str = "download_";

/// Name of the counter recorded by the list task (number of returned blobs)
pub const METRIC_LIST_SIZE: &str = "size";

/// Directory under the filesystem root holding per-bucket metadata documents
pub const FS_BUCKET_META_DIR: &str = ".buckets";

/// Default location assigned to filesystem buckets created without one
pub const FS_DEFAULT_LOCATION: &str = "LOCAL";

/// Default storage class assigned to filesystem buckets created without one
pub const FS_DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Default artifact directory used by LocalRunContext when none is configured
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

// =============================================================================
// Environment variables
// =============================================================================

/// Root directory of the filesystem backend; when set it serves every address
pub const ENV_FS_ROOT: &str = "STORAGE_TASKS_FS_ROOT";

/// Directory used for download temp files (system temp dir otherwise)
pub const ENV_TEMP_DIR: &str = "STORAGE_TASKS_TEMP_DIR";

/// Directory where LocalRunContext promotes temp files
pub const ENV_ARTIFACT_DIR: &str = "STORAGE_TASKS_ARTIFACT_DIR";

/// Primary GCS custom endpoint environment variable
pub const ENV_GCS_ENDPOINT_URL: &str = "GCS_ENDPOINT_URL";

/// GCS emulator convention environment variable (STORAGE_EMULATOR_HOST=host:port)
pub const ENV_STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";

/// Project used when inserting GCS buckets
pub const ENV_GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";

/// Buffer size for the download read/write loop (1 MB)
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024 * 1024;

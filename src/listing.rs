// src/listing.rs
//
// Blob listing engine: native request construction, eager collection and the
// order-preserving filter pipeline (directory/file filter, then regex).

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::DEFAULT_DELIMITER;
use crate::error::{TaskError, TaskResult};
use crate::object_store::{BlobListRequest, RawBlob, StorageConnection};
use crate::uri_utils::StorageAddress;

/// How deep a listing goes below the prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingMode {
    /// Every object under the prefix, recursively.
    Flat,
    /// Immediate children only; deeper objects collapse into directory entries.
    #[default]
    Directory,
}

/// Which kinds of entries a listing keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlobFilter {
    Files,
    #[value(alias = "directories")]
    #[serde(alias = "DIRECTORIES")]
    Directory,
    #[default]
    Both,
}

/// Caller-supplied listing options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingOptions {
    /// `None` leaves the service default in place; it is not the same as `Some(false)`.
    #[serde(default)]
    pub include_all_versions: Option<bool>,
    #[serde(default)]
    pub listing_mode: ListingMode,
    #[serde(default)]
    pub filter: BlobFilter,
    /// Regular expression matched against the full blob address.
    #[serde(default)]
    pub match_pattern: Option<String>,
}

/// A listed blob, addressed the same way as the listing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDescriptor {
    pub bucket: String,
    pub name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    pub is_directory: bool,
}

impl BlobDescriptor {
    pub fn from_raw(address: &StorageAddress, raw: RawBlob) -> Self {
        Self {
            bucket: address.bucket().to_string(),
            uri: address.uri_for(&raw.name),
            name: raw.name,
            size_bytes: raw.size,
            updated_at: raw.updated_at,
            content_type: raw.content_type,
            generation: raw.generation,
            is_directory: raw.is_directory,
        }
    }
}

/// Compile a match pattern as a whole-string regular expression.
///
/// The raw pattern is validated on its own first; a stray `)` would otherwise
/// close the wrapping group and detach the anchors.
pub fn compile_pattern(pattern: &str) -> TaskResult<Regex> {
    let invalid = |source| TaskError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    };
    Regex::new(pattern).map_err(invalid)?;
    Regex::new(&format!("^(?:{})$", pattern)).map_err(invalid)
}

/// Native listing request for an address and its options.
pub fn build_list_request(address: &StorageAddress, options: &ListingOptions) -> BlobListRequest {
    BlobListRequest {
        prefix: (!address.path().is_empty()).then(|| address.path().to_string()),
        versions: options.include_all_versions,
        delimiter: (options.listing_mode == ListingMode::Directory)
            .then(|| DEFAULT_DELIMITER.to_string()),
    }
}

/// Predicate keeping the entry kinds selected by `filter`.
pub fn filter_predicate(filter: BlobFilter) -> impl Fn(&BlobDescriptor) -> bool {
    move |blob| match filter {
        BlobFilter::Files => !blob.is_directory,
        BlobFilter::Directory => blob.is_directory,
        BlobFilter::Both => true,
    }
}

/// Predicate keeping entries whose full address matches `pattern` (if any).
pub fn pattern_predicate(pattern: Option<&Regex>) -> impl Fn(&BlobDescriptor) -> bool + '_ {
    move |blob| pattern.is_none_or(|re| re.is_match(&blob.uri))
}

/// Apply the filter pipeline to an already-listed sequence, keeping its order.
pub fn apply_filters(
    blobs: Vec<BlobDescriptor>,
    filter: BlobFilter,
    pattern: Option<&Regex>,
) -> Vec<BlobDescriptor> {
    let keep_kind = filter_predicate(filter);
    let keep_match = pattern_predicate(pattern);
    blobs
        .into_iter()
        .filter(|blob| keep_kind(blob) && keep_match(blob))
        .collect()
}

/// List blobs under `address` and return the filtered sequence in service order.
pub async fn list_blobs<C>(
    conn: &C,
    address: &StorageAddress,
    options: &ListingOptions,
) -> TaskResult<Vec<BlobDescriptor>>
where
    C: StorageConnection + ?Sized,
{
    let pattern = options
        .match_pattern
        .as_deref()
        .map(compile_pattern)
        .transpose()?;

    let request = build_list_request(address, options);
    debug!("Listing '{}' with {:?}", address, request);

    let raw = conn
        .list_blobs(address.bucket(), &request)
        .await
        .map_err(TaskError::StorageConnection)?;
    let total = raw.len();

    let blobs: Vec<BlobDescriptor> = raw
        .into_iter()
        .map(|record| BlobDescriptor::from_raw(address, record))
        .collect();
    let blobs = apply_filters(blobs, options.filter, pattern.as_ref());

    debug!("Kept {} of {} listed entries from '{}'", blobs.len(), total, address);
    Ok(blobs)
}

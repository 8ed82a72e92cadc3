// src/uri_utils.rs
//! Storage address resolution.
//!
//! Every task receives its target as an opaque address string of the form
//! `scheme://bucket[/path]`. This module turns that string into a
//! [`StorageAddress`] and nothing more: no `..` collapsing, no percent-decoding
//! and no bucket-name validation (the storage API owns those rules).

use std::fmt;
use std::str::FromStr;

use crate::constants::SCHEME_SEPARATOR;
use crate::error::{TaskError, TaskResult};

/// A resolved `scheme://bucket/path` address.
///
/// `bucket` is never empty and `path` never starts with `/`. An empty `path`
/// addresses the whole bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageAddress {
    scheme: String,
    bucket: String,
    path: String,
}

impl StorageAddress {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True when the address names the bucket itself rather than an object or prefix.
    pub fn is_bucket_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Full address of another object living in the same bucket.
    pub fn uri_for(&self, name: &str) -> String {
        format!("{}{}{}/{}", self.scheme, SCHEME_SEPARATOR, self.bucket, name)
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.bucket)
        } else {
            f.write_str(&self.uri_for(&self.path))
        }
    }
}

impl FromStr for StorageAddress {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve_address(s)
    }
}

/// Parse `scheme://bucket[/path]` into its components.
///
/// # Examples
///
/// ```
/// use storage_tasks::uri_utils::resolve_address;
///
/// let address = resolve_address("gs://my_bucket/dir/file.csv").unwrap();
/// assert_eq!(address.bucket(), "my_bucket");
/// assert_eq!(address.path(), "dir/file.csv");
///
/// let root = resolve_address("gs://my_bucket").unwrap();
/// assert_eq!(root.path(), "");
/// ```
pub fn resolve_address(address: &str) -> TaskResult<StorageAddress> {
    let (scheme, rest) = address
        .split_once(SCHEME_SEPARATOR)
        .ok_or_else(|| TaskError::malformed(address, "missing scheme"))?;

    if !is_valid_scheme(scheme) {
        return Err(TaskError::malformed(address, "missing or invalid scheme"));
    }

    let (bucket, path) = match rest.split_once('/') {
        Some((bucket, path)) => (bucket, path),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(TaskError::malformed(address, "empty bucket name"));
    }
    if path.starts_with('/') {
        return Err(TaskError::malformed(address, "object path must not begin with '/'"));
    }

    Ok(StorageAddress {
        scheme: scheme.to_string(),
        bucket: bucket.to_string(),
        path: path.to_string(),
    })
}

/// Infer the scheme from a URI string (lowercased).
pub fn infer_scheme_from_uri(uri: &str) -> TaskResult<String> {
    match uri.split_once(SCHEME_SEPARATOR) {
        Some((scheme, _)) if is_valid_scheme(scheme) => Ok(scheme.to_lowercase()),
        _ => Err(TaskError::malformed(uri, "missing scheme")),
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

// src/bucket.rs
//
// Bucket resolution policy: create when absent, otherwise update, skip or fail
// depending on the caller's ExistencePolicy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TaskError, TaskResult};
use crate::object_store::StorageConnection;

/// Desired target state of a bucket. Unset fields are left to the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_pays: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Materialised bucket state as reported by the storage service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub versioning_enabled: bool,
    #[serde(default)]
    pub requester_pays: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Policy to apply if a bucket already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExistencePolicy {
    #[default]
    Error,
    Update,
    Skip,
}

impl FromStr for ExistencePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "ERROR" => Ok(ExistencePolicy::Error),
            "UPDATE" => Ok(ExistencePolicy::Update),
            "SKIP" => Ok(ExistencePolicy::Skip),
            _ => bail!("Unknown ifExists policy: {}", s),
        }
    }
}

impl fmt::Display for ExistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistencePolicy::Error => write!(f, "ERROR"),
            ExistencePolicy::Update => write!(f, "UPDATE"),
            ExistencePolicy::Skip => write!(f, "SKIP"),
        }
    }
}

/// Which branch of the policy produced the returned bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BucketResolution {
    Created,
    Updated,
    Skipped,
}

/// Resolve a bucket against its desired state and return the resulting bucket.
pub async fn resolve_bucket<C>(conn: &C, spec: &BucketSpec, policy: ExistencePolicy) -> TaskResult<Bucket>
where
    C: StorageConnection + ?Sized,
{
    resolve_bucket_outcome(conn, spec, policy)
        .await
        .map(|(bucket, _)| bucket)
}

/// Same as [`resolve_bucket`], also reporting which branch was taken.
///
/// One probe, then at most one create or update call. Failures are returned
/// as-is; nothing is rolled back.
pub async fn resolve_bucket_outcome<C>(
    conn: &C,
    spec: &BucketSpec,
    policy: ExistencePolicy,
) -> TaskResult<(Bucket, BucketResolution)>
where
    C: StorageConnection + ?Sized,
{
    let existing = conn
        .get_bucket(&spec.name)
        .await
        .map_err(TaskError::StorageConnection)?;

    let Some(existing) = existing else {
        debug!("Bucket '{}' not found, creating it", spec.name);
        let bucket = conn
            .create_bucket(spec)
            .await
            .map_err(TaskError::StorageConnection)?;
        return Ok((bucket, BucketResolution::Created));
    };

    match policy {
        ExistencePolicy::Update => {
            debug!("Bucket '{}' exists, updating it", spec.name);
            let bucket = conn
                .update_bucket(spec)
                .await
                .map_err(TaskError::StorageConnection)?;
            Ok((bucket, BucketResolution::Updated))
        }
        ExistencePolicy::Skip => {
            debug!("Bucket '{}' exists, skipping", spec.name);
            Ok((existing, BucketResolution::Skipped))
        }
        ExistencePolicy::Error => Err(TaskError::BucketAlreadyExists(spec.name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("ERROR".parse::<ExistencePolicy>().unwrap(), ExistencePolicy::Error);
        assert_eq!("update".parse::<ExistencePolicy>().unwrap(), ExistencePolicy::Update);
        assert_eq!("Skip".parse::<ExistencePolicy>().unwrap(), ExistencePolicy::Skip);
        assert!("replace".parse::<ExistencePolicy>().is_err());
    }

    #[test]
    fn test_policy_default_is_error() {
        assert_eq!(ExistencePolicy::default(), ExistencePolicy::Error);
        assert_eq!(ExistencePolicy::default().to_string(), "ERROR");
    }

    #[test]
    fn test_spec_deserialize_camel_case() {
        let spec: BucketSpec = serde_json::from_str(
            r#"{"name":"my-bucket","versioningEnabled":true,"labels":{"my-label":"my-value"}}"#,
        )
        .unwrap();
        assert_eq!(spec.name, "my-bucket");
        assert_eq!(spec.versioning_enabled, Some(true));
        assert_eq!(spec.labels.unwrap()["my-label"], "my-value");
        assert!(spec.location.is_none());
    }
}

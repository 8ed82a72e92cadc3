// src/context.rs
//
// Host-runtime seam: variable rendering, metric counters and promotion of
// temp files into durable artifacts. The tasks call these; the workflow engine
// supplies the real implementation. LocalRunContext is the standalone one used
// by the CLI and the tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::io::ErrorKind;
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tempfile::TempPath;
use tokio::fs;
use tracing::debug;

/// `{{ name }}` placeholders, whitespace inside the braces is optional.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
});

/// A named numeric metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub name: String,
    pub value: f64,
}

impl Counter {
    pub fn of(name: impl Into<String>, value: impl Into<f64>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Services the host runtime offers to a running task.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Render a templated input string. Runs before any address resolution.
    fn render(&self, template: &str) -> Result<String>;

    /// Record a counter.
    fn metric(&self, counter: Counter);

    /// Promote a local temp file to durable storage and return its URI.
    async fn put_temp_file(&self, file: TempPath) -> Result<String>;
}

/// Self-contained ExecutionContext: variables from a map, counters kept in
/// memory, artifacts moved into a local directory.
#[derive(Debug)]
pub struct LocalRunContext {
    variables: HashMap<String, String>,
    artifact_dir: PathBuf,
    metrics: Mutex<Vec<Counter>>,
}

impl LocalRunContext {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            variables: HashMap::new(),
            artifact_dir: artifact_dir.into(),
            metrics: Mutex::new(Vec::new()),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.variables
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Snapshot of the counters recorded so far.
    pub fn metrics(&self) -> Vec<Counter> {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ExecutionContext for LocalRunContext {
    fn render(&self, template: &str) -> Result<String> {
        let mut missing = Vec::new();
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    missing.push(caps[1].to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            bail!("Unable to render '{}': missing variable(s) {}", template, missing.join(", "));
        }
        Ok(rendered.into_owned())
    }

    fn metric(&self, counter: Counter) {
        debug!("metric {}={}", counter.name, counter.value);
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(counter);
    }

    async fn put_temp_file(&self, file: TempPath) -> Result<String> {
        let file_name = file
            .file_name()
            .map(|n| n.to_owned())
            .context("Temp file has no file name")?;

        fs::create_dir_all(&self.artifact_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.artifact_dir.display()))?;
        let target = self.artifact_dir.join(file_name);

        match fs::rename(&file, &target).await {
            Ok(()) => {}
            // A rename is not possible across filesystems, fall back to a copy
            Err(rename_err) if rename_err.kind() == ErrorKind::CrossesDevices => {
                fs::copy(&file, &target).await.with_context(|| {
                    format!(
                        "Failed to copy {} to {} (rename failed: {})",
                        file.display(),
                        target.display(),
                        rename_err
                    )
                })?;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to move {} to {}", file.display(), target.display())
                });
            }
        }
        // Dropping the TempPath removes the source if it is still there
        drop(file);

        let target = std::path::absolute(&target).unwrap_or(target);
        Ok(format!("file://{}", target.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_variables() {
        let ctx = LocalRunContext::new("unused")
            .with_variable("bucket", "my_bucket")
            .with_variables([("dir", "data")]);
        assert_eq!(
            ctx.render("gs://{{ bucket }}/{{dir}}/file.csv").unwrap(),
            "gs://my_bucket/data/file.csv"
        );
        assert_eq!(ctx.render("gs://plain/path").unwrap(), "gs://plain/path");
    }

    #[test]
    fn test_render_missing_variable() {
        let ctx = LocalRunContext::new("unused");
        let err = ctx.render("gs://{{ bucket }}/x").unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_metrics_are_collected() {
        let ctx = LocalRunContext::new("unused");
        ctx.metric(Counter::of("size", 3u32));
        ctx.metric(Counter::of("size", 4u32));
        let metrics = ctx.metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1], Counter::of("size", 4u32));
    }

    #[tokio::test]
    async fn test_put_temp_file_moves_into_artifact_dir() {
        let scratch = TempDir::new().unwrap();
        let artifacts = scratch.path().join("artifacts");
        let ctx = LocalRunContext::new(&artifacts);

        let temp = tempfile::Builder::new()
            .prefix("download_")
            .suffix(".csv")
            .tempfile_in(scratch.path())
            .unwrap();
        std::fs::write(temp.path(), b"payload").unwrap();
        let source = temp.path().to_path_buf();

        let uri = ctx.put_temp_file(temp.into_temp_path()).await.unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with(".csv"));
        assert!(!source.exists());

        let promoted = artifacts.join(source.file_name().unwrap());
        assert_eq!(std::fs::read(promoted).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_put_temp_file_reports_rename_failure() {
        let scratch = TempDir::new().unwrap();
        let artifacts = scratch.path().join("artifacts");
        let ctx = LocalRunContext::new(&artifacts);

        let temp = tempfile::Builder::new()
            .prefix("download_")
            .tempfile_in(scratch.path())
            .unwrap();
        let source = temp.path().to_path_buf();

        // A non-empty directory already sits at the target name
        let blocker = artifacts.join(source.file_name().unwrap());
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let err = ctx.put_temp_file(temp.into_temp_path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to move"), "{err:#}");
        assert!(blocker.join("keep").exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_metrics_survive_poisoned_lock() {
        let ctx = LocalRunContext::new("unused");
        ctx.metric(Counter::of("size", 1u32));

        std::thread::scope(|s| {
            let result = s
                .spawn(|| {
                    let _guard = ctx.metrics.lock().unwrap();
                    panic!("poison the metrics lock");
                })
                .join();
            assert!(result.is_err());
        });
        assert!(ctx.metrics.is_poisoned());

        ctx.metric(Counter::of("size", 2u32));
        assert_eq!(
            ctx.metrics(),
            vec![Counter::of("size", 1u32), Counter::of("size", 2u32)]
        );
    }
}

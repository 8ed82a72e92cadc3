// src/config.rs
//
// Runtime settings, read from the environment (and .env via dotenvy in the CLI).

use std::path::PathBuf;

use crate::constants::{
    DEFAULT_ARTIFACT_DIR, ENV_ARTIFACT_DIR, ENV_FS_ROOT, ENV_GCS_ENDPOINT_URL,
    ENV_GOOGLE_CLOUD_PROJECT, ENV_STORAGE_EMULATOR_HOST, ENV_TEMP_DIR,
};

/// Runtime parameters shared by the tasks and the backend factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    pub fs_root:      Option<PathBuf>, // serve every address from this local tree
    pub gcs_endpoint: Option<String>,  // emulator / proxy endpoint
    pub project_id:   Option<String>,  // project for GCS bucket inserts
    pub temp_dir:     Option<PathBuf>, // where downloads allocate temp files
    pub artifact_dir: Option<PathBuf>, // where LocalRunContext promotes them
}

impl TaskConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gcs_endpoint = get(ENV_GCS_ENDPOINT_URL).or_else(|| {
            // GCS emulator convention: STORAGE_EMULATOR_HOST=host:port
            get(ENV_STORAGE_EMULATOR_HOST).map(|host| {
                if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("http://{}", host)
                }
            })
        });

        Self {
            fs_root: get(ENV_FS_ROOT).map(PathBuf::from),
            gcs_endpoint,
            project_id: get(ENV_GOOGLE_CLOUD_PROJECT),
            temp_dir: get(ENV_TEMP_DIR).map(PathBuf::from),
            artifact_dir: get(ENV_ARTIFACT_DIR).map(PathBuf::from),
        }
    }

    /// Artifact directory, falling back to `./artifacts`.
    pub fn artifact_dir_or_default(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR))
    }
}

//! Project configuration
//!
//! A project keeps its settings in `.outtrack/config.json` under the project
//! root:
//!
//! ```json
//! {
//!   "cache": { "local": ".outtrack/cache", "s3": "remote://storage/cache" },
//!   "remotes": { "storage": "s3://bucket/project" },
//!   "compression": "fast",
//!   "jobs": 8
//! }
//! ```
//!
//! Every section is optional. A missing file is the default configuration: a
//! local cache at `.outtrack/cache`, no remotes, fast compression and one hash
//! worker per CPU.

use crate::compression::CompressionStrategy;
use crate::error::{OutputError, Result};
use crate::path_info::{expand_remote_alias, Scheme};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding project metadata
pub const PROJECT_DIR: &str = ".outtrack";
/// Configuration file name inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.json";

fn default_local_cache() -> Option<PathBuf> {
    Some(Path::new(PROJECT_DIR).join("cache"))
}

fn default_jobs() -> usize {
    num_cpus::get()
}

/// Cache locations per scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Local cache directory, relative to the project root; `null` disables it
    #[serde(default = "default_local_cache")]
    pub local: Option<PathBuf>,
    /// Cache urls for remote schemes (`"s3": "s3://bucket/cache"`)
    #[serde(flatten)]
    pub remote: BTreeMap<String, String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local: default_local_cache(),
            remote: BTreeMap::new(),
        }
    }
}

/// Contents of `.outtrack/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Cache locations
    #[serde(default)]
    pub cache: CacheConfig,
    /// Named remotes usable as `remote://<name>/<path>`
    #[serde(default)]
    pub remotes: BTreeMap<String, String>,
    /// Compression for local cache objects
    #[serde(default)]
    pub compression: CompressionStrategy,
    /// Parallel hash workers
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            remotes: BTreeMap::new(),
            compression: CompressionStrategy::default(),
            jobs: default_jobs(),
        }
    }
}

impl ProjectConfig {
    /// Location of the config file for a project root
    pub fn path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join(CONFIG_FILE)
    }

    /// Load the configuration of the project at `root`
    ///
    /// # Errors
    ///
    /// - [`OutputError::InvalidConfiguration`] if the file is not valid JSON
    ///   or fails validation
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let config = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<ProjectConfig>(&bytes)
                .map_err(|e| OutputError::InvalidConfiguration(format!("{:?}: {}", path, e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                ProjectConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration for the project at `root`
    pub fn save(&self, root: &Path) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        utils::atomic_write(&Self::path(root), json.as_bytes())
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(OutputError::InvalidConfiguration("jobs must be at least 1".to_string()));
        }
        for (name, url) in &self.remotes {
            if Scheme::detect(url).is_none() {
                return Err(OutputError::InvalidConfiguration(format!(
                    "remote '{}' has unsupported url '{}'",
                    name, url
                )));
            }
        }
        for key in self.cache.remote.keys() {
            match Scheme::from_name(key) {
                Some(Scheme::Local) | None => {
                    return Err(OutputError::InvalidConfiguration(format!(
                        "unknown cache scheme '{}'",
                        key
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Absolute local cache directory, if the local cache is enabled
    pub fn local_cache_dir(&self, root: &Path) -> Option<PathBuf> {
        self.cache.local.as_ref().map(|dir| root.join(dir))
    }

    /// Cache url configured for a remote scheme, with aliases expanded
    pub fn cache_url(&self, scheme: Scheme) -> Result<Option<String>> {
        self.cache
            .remote
            .iter()
            .find(|(key, _)| Scheme::from_name(key) == Some(scheme))
            .map(|(_, url)| expand_remote_alias(url, &self.remotes))
            .transpose()
    }
}

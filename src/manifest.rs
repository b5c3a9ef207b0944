//! Content fingerprints for local files and directory trees
//!
//! A file is fingerprinted by the SHA-256 of its content plus its size. A
//! directory is described by a [`DirManifest`] (every regular file below it,
//! sorted by relative path, with its hash and size); the directory's
//! fingerprint is the hash of that manifest with a `.dir` suffix. The same
//! manifest is what the local cache stores to restore a directory.
//!
//! Hashing runs in parallel with rayon and memoizes per-file hashes in a
//! [`StateIndex`].

use crate::error::{OutputError, Result};
use crate::fingerprint::{Fingerprint, DIR_SUFFIX};
use crate::state::StateIndex;
use crate::utils;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// One file inside a directory artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Forward-slash path relative to the directory
    pub path: String,
    /// SHA-256 of the content
    pub hash: String,
    /// Size in bytes
    pub size: u64,
}

/// Sorted listing of a directory artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirManifest {
    /// Files, sorted by path
    pub entries: Vec<ManifestEntry>,
}

impl DirManifest {
    /// Canonical bytes of the manifest (what gets hashed and cached)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse manifest bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Directory hash: manifest hash plus the `.dir` suffix
    pub fn hash(&self) -> Result<String> {
        Ok(format!("{}{}", utils::hash_data(&self.to_bytes()?), DIR_SUFFIX))
    }

    /// Sum of all file sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Fingerprint of the directory described by this manifest
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Ok(Fingerprint::from_hash(self.hash()?, self.total_size()))
    }
}

/// Hashes files and directory trees, reusing remembered hashes
#[derive(Debug, Clone)]
pub struct TreeHasher {
    state: Arc<StateIndex>,
    pool: Option<Arc<ThreadPool>>,
}

impl Default for TreeHasher {
    fn default() -> Self {
        Self::new(Arc::new(StateIndex::in_memory()))
    }
}

impl TreeHasher {
    /// Hasher over the global rayon pool
    pub fn new(state: Arc<StateIndex>) -> Self {
        Self { state, pool: None }
    }

    /// Hasher with a dedicated pool of `jobs` workers
    pub fn with_jobs(state: Arc<StateIndex>, jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("outtrack-hash-{}", i))
            .build()
            .map_err(|e| OutputError::internal(format!("failed to build hash pool: {}", e)))?;
        Ok(Self {
            state,
            pool: Some(Arc::new(pool)),
        })
    }

    /// State index used for memoization
    pub fn state(&self) -> &Arc<StateIndex> {
        &self.state
    }

    /// Hash and size of a single file
    pub fn hash_file(&self, path: &Path) -> Result<(String, u64)> {
        let metadata = fs::metadata(path)?;
        if let Some(hash) = self.state.get(path, &metadata) {
            return Ok((hash, metadata.len()));
        }

        let hash = utils::hash_file_content(path)?;
        self.state.update(path, &metadata, &hash)?;
        trace!("Hashed {:?}: {}", path, &hash[..8]);
        Ok((hash, metadata.len()))
    }

    /// Manifest of every regular file below `dir`
    pub fn scan_dir(&self, dir: &Path) -> Result<DirManifest> {
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let relative = utils::relative_slash_path(entry.path(), dir)?;
                files.push((relative, entry.path().to_path_buf()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let hash_all = || {
            files
                .par_iter()
                .map(|(relative, path)| {
                    let (hash, size) = self.hash_file(path)?;
                    Ok(ManifestEntry {
                        path: relative.clone(),
                        hash,
                        size,
                    })
                })
                .collect::<Result<Vec<_>>>()
        };
        let entries = match &self.pool {
            Some(pool) => pool.install(hash_all)?,
            None => hash_all()?,
        };

        debug!("Scanned {:?}: {} files", dir, entries.len());
        Ok(DirManifest { entries })
    }

    /// Fingerprint of a file or directory
    ///
    /// # Errors
    ///
    /// - [`OutputError::DoesNotExist`] if nothing exists at `path`
    /// - [`OutputError::IsNotFileOrDir`] for sockets, fifos, devices
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OutputError::DoesNotExist(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            self.scan_dir(path)?.fingerprint()
        } else if metadata.is_file() {
            let (hash, size) = self.hash_file(path)?;
            Ok(Fingerprint::from_hash(hash, size))
        } else {
            Err(OutputError::IsNotFileOrDir(path.display().to_string()))
        }
    }
}

//! Hash state index
//!
//! Hashing a large artifact on every change check would make pipeline
//! planning slow. `StateIndex` remembers the hash computed for a path together
//! with the file's size and modification time; as long as both still match,
//! the remembered hash is reused instead of re-reading the file.
//!
//! The index is an optimization only. A stale or corrupt index file is
//! discarded with a warning and the hashes are recomputed.

use crate::error::Result;
use crate::utils;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Remembered hash for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// File size in bytes when hashed
    pub size: u64,
    /// Modification time in nanoseconds when hashed
    pub mtime_ns: u64,
    /// SHA-256 of the content
    pub hash: String,
}

/// Concurrent path → hash memo, optionally persisted to disk
#[derive(Debug, Default)]
pub struct StateIndex {
    entries: DashMap<PathBuf, StateEntry>,
    location: Option<PathBuf>,
}

impl StateIndex {
    /// Index that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or start) an index persisted at `location`
    pub fn open(location: PathBuf) -> Self {
        let entries = DashMap::new();

        if location.exists() {
            match fs::read(&location) {
                Ok(bytes) => {
                    match bincode::serde::decode_from_slice::<Vec<(PathBuf, StateEntry)>, _>(
                        &bytes,
                        bincode::config::standard(),
                    ) {
                        Ok((loaded, _)) => {
                            debug!("Loaded {} state entries", loaded.len());
                            for (path, entry) in loaded {
                                entries.insert(path, entry);
                            }
                        }
                        Err(e) => {
                            warn!("Discarding corrupt state index {:?}: {}", location, e);
                            fs::remove_file(&location).ok();
                        }
                    }
                }
                Err(e) => warn!("Failed to read state index {:?}: {}", location, e),
            }
        }

        Self {
            entries,
            location: Some(location),
        }
    }

    /// Remembered hash for `path`, if its metadata is unchanged
    pub fn get(&self, path: &Path, metadata: &fs::Metadata) -> Option<String> {
        let entry = self.entries.get(path)?;
        let mtime_ns = utils::mtime_ns(metadata).ok()?;
        if entry.size == metadata.len() && entry.mtime_ns == mtime_ns {
            trace!("State hit for {:?}", path);
            Some(entry.hash.clone())
        } else {
            None
        }
    }

    /// Remember the hash computed for `path`
    pub fn update(&self, path: &Path, metadata: &fs::Metadata, hash: &str) -> Result<()> {
        let entry = StateEntry {
            size: metadata.len(),
            mtime_ns: utils::mtime_ns(metadata)?,
            hash: hash.to_string(),
        };
        self.entries.insert(path.to_path_buf(), entry);
        Ok(())
    }

    /// Forget a path (and everything below it)
    pub fn forget(&self, path: &Path) {
        self.entries.retain(|p, _| !p.starts_with(path));
    }

    /// Number of remembered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index to its location, if it has one
    pub fn persist(&self) -> Result<()> {
        let Some(location) = &self.location else {
            return Ok(());
        };

        let mut snapshot: Vec<(PathBuf, StateEntry)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        let bytes = bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())?;
        utils::atomic_write(location, &bytes)?;
        debug!("Persisted {} state entries ({} bytes)", snapshot.len(), bytes.len());
        Ok(())
    }
}

//! Local content-addressable cache
//!
//! Every distinct file content is stored once, addressed by its SHA-256 hash.
//! Directories are stored as a [`DirManifest`] object (addressed by the
//! manifest hash plus `.dir`) next to the objects of their files.
//!
//! ## Layout
//!
//! ```text
//! cache_root/
//! ├── metadata.json     # Format version, creation time, compression
//! └── objects/
//!     └── <prefix>/     # First 2 chars of hash
//!         └── <suffix>  # Remaining hash chars (LZ4-framed content)
//! ```
//!
//! Objects are written through a temporary file and renamed into place, so a
//! reader never observes a partially written object, and an object that
//! already exists is never rewritten.

use crate::cache::Cache;
use crate::compression::{CompressionEngine, CompressionStrategy};
use crate::error::{OutputError, Result};
use crate::fingerprint::{Fingerprint, DIR_SUFFIX, HASH_KEY};
use crate::manifest::{DirManifest, TreeHasher};
use crate::path_info::{PathInfo, Scheme};
use crate::utils;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

const METADATA_FILE: &str = "metadata.json";
const OBJECTS_DIR: &str = "objects";
const FORMAT_VERSION: u32 = 1;

/// Persisted description of a cache directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// On-disk format version
    pub format_version: u32,
    /// Version of outtrack that created the cache
    pub outtrack_version: String,
    /// When the cache was created
    pub created_at: DateTime<Utc>,
    /// Compression used for new objects
    pub compression: CompressionStrategy,
}

/// Object counts for a cache
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored objects (files and directory manifests)
    pub object_count: usize,
    /// Bytes used by stored objects on disk
    pub total_size: u64,
}

/// Content-addressable cache on the local filesystem
pub struct LocalCache {
    root: PathBuf,
    compression: CompressionEngine,
    hasher: TreeHasher,
    metadata: CacheMetadata,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("root", &self.root)
            .field("compression", &self.compression.strategy())
            .finish()
    }
}

impl LocalCache {
    /// Open the cache at `root`, initializing it if needed
    ///
    /// # Errors
    ///
    /// - [`OutputError::Io`] if the directories cannot be created
    /// - [`OutputError::Json`] if an existing `metadata.json` is unreadable
    pub fn open(root: PathBuf, compression: CompressionEngine, hasher: TreeHasher) -> Result<Self> {
        fs::create_dir_all(root.join(OBJECTS_DIR))?;

        let metadata_path = root.join(METADATA_FILE);
        let metadata = if metadata_path.exists() {
            let metadata: CacheMetadata = serde_json::from_slice(&fs::read(&metadata_path)?)?;
            if metadata.format_version != FORMAT_VERSION {
                return Err(OutputError::cache(format!(
                    "unsupported cache format version {} at {:?}",
                    metadata.format_version, root
                )));
            }
            debug!("Opened cache at {:?}", root);
            metadata
        } else {
            let metadata = CacheMetadata {
                format_version: FORMAT_VERSION,
                outtrack_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: Utc::now(),
                compression: compression.strategy(),
            };
            utils::atomic_write(&metadata_path, serde_json::to_string_pretty(&metadata)?.as_bytes())?;
            info!("Initialized cache at {:?}", root);
            metadata
        };

        Ok(Self {
            root,
            compression,
            hasher,
            metadata,
        })
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache metadata
    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    /// Path of the object stored under `hash` (with sharding)
    pub fn object_path(&self, hash: &str) -> Result<PathBuf> {
        validate_hash(hash)?;
        let (prefix, suffix) = hash.split_at(2);
        Ok(self.root.join(OBJECTS_DIR).join(prefix).join(suffix))
    }

    /// Whether an object is stored under `hash`
    pub fn contains(&self, hash: &str) -> bool {
        self.object_path(hash).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Store content under its own hash; returns the hash
    pub fn store_object(&self, content: &[u8]) -> Result<String> {
        let hash = utils::hash_data(content);
        self.write_object(&hash, content)?;
        Ok(hash)
    }

    fn write_object(&self, hash: &str, content: &[u8]) -> Result<()> {
        let object_path = self.object_path(hash)?;
        if object_path.is_file() {
            trace!("Object {} already cached", &hash[..8]);
            return Ok(());
        }

        let framed = self.compression.compress(content);
        utils::atomic_write(&object_path, &framed)?;
        trace!("Stored object {} ({} bytes)", &hash[..8], framed.len());
        Ok(())
    }

    /// Load and verify the content stored under `hash`
    ///
    /// # Errors
    ///
    /// - [`OutputError::ObjectNotFound`] if nothing is stored under `hash`
    /// - [`OutputError::HashMismatch`] if the stored content was corrupted
    pub fn load_object(&self, hash: &str) -> Result<Vec<u8>> {
        let object_path = self.object_path(hash)?;
        if !object_path.is_file() {
            return Err(OutputError::ObjectNotFound(hash.to_string()));
        }

        let content = self.compression.decompress(&fs::read(&object_path)?)?;
        let expected = hash.trim_end_matches(DIR_SUFFIX);
        let actual = utils::hash_data(&content);
        if actual != expected {
            return Err(OutputError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(content)
    }

    /// Store a directory manifest; returns its `.dir` hash
    pub fn store_manifest(&self, manifest: &DirManifest) -> Result<String> {
        let hash = manifest.hash()?;
        self.write_object(&hash, &manifest.to_bytes()?)?;
        Ok(hash)
    }

    /// Load the directory manifest stored under a `.dir` hash
    pub fn load_manifest(&self, hash: &str) -> Result<DirManifest> {
        DirManifest::from_bytes(&self.load_object(hash)?)
    }

    /// Whether `hash` and, for directories, every file it lists are stored
    pub fn is_complete(&self, hash: &str) -> bool {
        if !self.contains(hash) {
            return false;
        }
        if !hash.ends_with(DIR_SUFFIX) {
            return true;
        }
        match self.load_manifest(hash) {
            Ok(manifest) => manifest.entries.iter().all(|e| self.contains(&e.hash)),
            Err(_) => false,
        }
    }

    /// Hashes of every stored object
    pub fn list_objects(&self) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        let objects_dir = self.root.join(OBJECTS_DIR);
        for shard_entry in fs::read_dir(objects_dir)? {
            let shard_entry = shard_entry?;
            if !shard_entry.path().is_dir() {
                continue;
            }
            let shard_name = shard_entry.file_name().to_string_lossy().to_string();
            for object_entry in fs::read_dir(shard_entry.path())? {
                let object_entry = object_entry?;
                if object_entry.path().is_file() {
                    let object_name = object_entry.file_name().to_string_lossy().to_string();
                    objects.push(format!("{}{}", shard_name, object_name));
                }
            }
        }
        objects.sort();
        Ok(objects)
    }

    /// Object counts and on-disk size
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for hash in self.list_objects()? {
            stats.object_count += 1;
            stats.total_size += fs::metadata(self.object_path(&hash)?)?.len();
        }
        Ok(stats)
    }

    fn fs_path(info: &PathInfo) -> Result<PathBuf> {
        info.fs_path()
            .ok_or_else(|| OutputError::cache(format!("local cache cannot hold '{}'", info.url)))
    }

    fn restore_file(&self, hash: &str, target: &Path) -> Result<()> {
        let content = self.load_object(hash)?;
        utils::atomic_write(target, &content)?;
        self.hasher.state().update(target, &fs::metadata(target)?, hash)?;
        Ok(())
    }
}

impl Cache for LocalCache {
    fn scheme(&self) -> Scheme {
        Scheme::Local
    }

    fn changed(&self, info: &PathInfo, recorded: Option<&Fingerprint>) -> Result<bool> {
        let Some(hash) = recorded.and_then(Fingerprint::hash) else {
            debug!("'{}' has no recorded hash", info.url);
            return Ok(true);
        };
        if !self.is_complete(hash) {
            debug!("Cache for '{}' is missing {}", info.url, hash);
            return Ok(true);
        }

        let current = match self.hasher.fingerprint(&Self::fs_path(info)?) {
            Ok(current) => current,
            Err(OutputError::DoesNotExist(_)) => return Ok(true),
            Err(e) => return Err(e),
        };
        let changed = current.hash() != Some(hash);
        debug!("'{}' changed: {}", info.url, changed);
        Ok(changed)
    }

    fn save(&self, info: &PathInfo) -> Result<Fingerprint> {
        let path = Self::fs_path(info)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OutputError::DoesNotExist(info.url.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let fingerprint = if metadata.is_dir() {
            let manifest = self.hasher.scan_dir(&path)?;
            manifest.entries.par_iter().try_for_each(|entry| -> Result<()> {
                if self.contains(&entry.hash) {
                    return Ok(());
                }
                let content = fs::read(utils::join_slash_path(&path, &entry.path))?;
                let actual = utils::hash_data(&content);
                if actual != entry.hash {
                    return Err(OutputError::HashMismatch {
                        expected: entry.hash.clone(),
                        actual,
                    });
                }
                self.write_object(&entry.hash, &content)
            })?;
            self.store_manifest(&manifest)?;
            manifest.fingerprint()?
        } else if metadata.is_file() {
            let content = fs::read(&path)?;
            let hash = self.store_object(&content)?;
            self.hasher.state().update(&path, &metadata, &hash)?;
            Fingerprint::from_hash(hash, content.len() as u64)
        } else {
            return Err(OutputError::IsNotFileOrDir(info.url.clone()));
        };

        info!(
            "Saved '{}' to cache ({}, {})",
            info.url,
            fingerprint,
            utils::format_bytes(fingerprint.size().unwrap_or(0))
        );
        Ok(fingerprint)
    }

    fn checkout(&self, info: &PathInfo, recorded: &Fingerprint, force: bool) -> Result<()> {
        let hash = recorded
            .hash()
            .ok_or_else(|| OutputError::IncompleteFingerprint(HASH_KEY.to_string()))?;
        if !self.is_complete(hash) {
            return Err(OutputError::ObjectNotFound(hash.to_string()));
        }

        let path = Self::fs_path(info)?;
        if fs::symlink_metadata(&path).is_ok() {
            match self.hasher.fingerprint(&path) {
                Ok(current) if current.hash() == Some(hash) => {
                    debug!("'{}' is up to date", info.url);
                    return Ok(());
                }
                _ if !force => return Err(OutputError::CheckoutConflict { path }),
                _ => {
                    debug!("Discarding workspace copy of '{}'", info.url);
                    utils::remove_path(&path)?;
                    self.hasher.state().forget(&path);
                }
            }
        }

        if recorded.is_dir() {
            let manifest = self.load_manifest(hash)?;
            fs::create_dir_all(&path)?;
            manifest.entries.par_iter().try_for_each(|entry| {
                self.restore_file(&entry.hash, &utils::join_slash_path(&path, &entry.path))
            })?;
        } else {
            self.restore_file(hash, &path)?;
        }

        info!("Checked out '{}' ({})", info.url, recorded);
        Ok(())
    }
}

/// Hashes are lowercase hex, optionally with the `.dir` suffix
fn validate_hash(hash: &str) -> Result<()> {
    let hex = hash.strip_suffix(DIR_SUFFIX).unwrap_or(hash);
    if hex.len() < 3 || !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(OutputError::cache(format!("invalid object hash '{}'", hash)));
    }
    Ok(())
}

//! Local filesystem remote

use super::{check_pairs, Remote};
use crate::error::{OutputError, Result};
use crate::fingerprint::Fingerprint;
use crate::manifest::TreeHasher;
use crate::path_info::{PathInfo, Scheme};
use crate::utils;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Remote over the local filesystem
///
/// Fingerprints are content hashes computed by a [`TreeHasher`], so a local
/// output that is not cache-backed still notices content changes.
#[derive(Debug, Clone, Default)]
pub struct LocalRemote {
    hasher: TreeHasher,
}

impl LocalRemote {
    /// Create a local remote hashing through `hasher`
    pub fn new(hasher: TreeHasher) -> Self {
        Self { hasher }
    }

    /// Hasher used for fingerprints
    pub fn hasher(&self) -> &TreeHasher {
        &self.hasher
    }

    fn fs_path(info: &PathInfo) -> Result<PathBuf> {
        info.fs_path().ok_or_else(|| {
            OutputError::remote(format!("local remote cannot handle '{}'", info.url))
        })
    }
}

impl Remote for LocalRemote {
    fn scheme(&self) -> Scheme {
        Scheme::Local
    }

    fn exists(&self, info: &PathInfo) -> Result<bool> {
        let path = Self::fs_path(info)?;
        Ok(fs::symlink_metadata(path).is_ok())
    }

    fn save_info(&self, info: &PathInfo) -> Result<Fingerprint> {
        self.hasher.fingerprint(&Self::fs_path(info)?)
    }

    fn download(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        check_pairs(from, to)?;
        for (src, dst) in from.iter().zip(to) {
            let src_path = Self::fs_path(src)?;
            if !src_path.exists() {
                return Err(OutputError::DoesNotExist(src.url.clone()));
            }
            let dst_path = Self::fs_path(dst)?;
            utils::copy_path(&src_path, &dst_path)?;
            trace!("Copied {:?} -> {:?}", src_path, dst_path);
        }
        Ok(())
    }

    fn upload(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        // Both ends are local, so an upload is the same copy
        self.download(from, to)
    }

    fn move_to(&self, from: &PathInfo, to: &PathInfo) -> Result<()> {
        let src = Self::fs_path(from)?;
        let dst = Self::fs_path(to)?;
        if fs::symlink_metadata(&src).is_err() {
            return Err(OutputError::DoesNotExist(from.url.clone()));
        }

        utils::move_path(&src, &dst)?;
        self.hasher.state().forget(&src);
        debug!("Moved {:?} -> {:?}", src, dst);
        Ok(())
    }

    fn remove(&self, info: &PathInfo) -> Result<()> {
        let path = Self::fs_path(info)?;
        utils::remove_path(&path)?;
        self.hasher.state().forget(&path);
        debug!("Removed {:?}", path);
        Ok(())
    }
}

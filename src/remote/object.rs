//! Object-store remotes
//!
//! S3, GCS, SSH, HDFS and HTTP remotes all reduce to the same model: a flat
//! namespace of keys holding immutable blobs, where a "directory" is every key
//! sharing a `<key>/` prefix. [`ObjectRemote`] implements the remote
//! operations on top of that model and leaves the wire protocol to an
//! [`ObjectStore`] transport.
//!
//! [`MemoryObjectStore`] is an in-process transport, used for tests and for
//! staging artifacts without a network.

use super::{check_pairs, Remote};
use crate::error::{OutputError, Result};
use crate::fingerprint::{Fingerprint, DIR_SUFFIX, ETAG_KEY, SIZE_KEY};
use crate::path_info::{PathInfo, Scheme};
use crate::utils;
use dashmap::DashMap;
use std::fmt;
use std::fs;
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Entity tag, changes whenever the content changes
    pub etag: String,
    /// Size in bytes
    pub size: u64,
}

/// Transport for a flat key/blob namespace
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Metadata for `key`, `None` if absent
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;
    /// Content of `key`
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Store `data` under `key`, replacing any previous content
    fn put(&self, key: &str, data: &[u8]) -> Result<ObjectMeta>;
    /// Server-side copy
    fn copy(&self, from: &str, to: &str) -> Result<()>;
    /// Delete `key`; missing keys are ignored
    fn delete(&self, key: &str) -> Result<()>;
    /// All keys starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn meta(data: &[u8]) -> ObjectMeta {
        ObjectMeta {
            etag: format!("\"{}\"", &utils::hash_data(data)[..32]),
            size: data.len() as u64,
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.get(key).map(|data| Self::meta(&data)))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(key)
            .map(|data| data.clone())
            .ok_or_else(|| OutputError::ObjectNotFound(key.to_string()))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<ObjectMeta> {
        self.objects.insert(key.to_string(), data.to_vec());
        Ok(Self::meta(data))
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let data = self.get(from)?;
        self.objects.insert(to.to_string(), data);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Remote over an object-store transport
#[derive(Debug, Clone)]
pub struct ObjectRemote {
    scheme: Scheme,
    store: Option<Arc<dyn ObjectStore>>,
}

impl ObjectRemote {
    /// Remote bound to a transport
    pub fn new(scheme: Scheme, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            scheme,
            store: Some(store),
        }
    }

    /// Remote without a transport; every operation fails until one is bound
    pub fn unconfigured(scheme: Scheme) -> Self {
        Self { scheme, store: None }
    }

    /// Whether writes are refused (plain HTTP locations)
    pub fn is_read_only(&self) -> bool {
        self.scheme == Scheme::Http
    }

    fn store(&self) -> Result<&Arc<dyn ObjectStore>> {
        self.store.as_ref().ok_or_else(|| OutputError::RemoteNotConfigured {
            scheme: self.scheme.to_string(),
        })
    }

    fn writable(&self) -> Result<&Arc<dyn ObjectStore>> {
        if self.is_read_only() {
            return Err(OutputError::remote(format!(
                "'{}' remotes are read-only",
                self.scheme
            )));
        }
        self.store()
    }

    /// Keys making up the artifact: the object itself, or everything below
    /// its prefix (returned as `(key, relative)` pairs)
    fn members(&self, info: &PathInfo) -> Result<Vec<(String, String)>> {
        let store = self.store()?;
        let key = info.object_key();
        if store.head(&key)?.is_some() {
            return Ok(vec![(key, String::new())]);
        }

        let prefix = format!("{}/", key.trim_end_matches('/'));
        Ok(store
            .list(&prefix)?
            .into_iter()
            .map(|k| {
                let relative = k[prefix.len()..].to_string();
                (k, relative)
            })
            .collect())
    }

    /// Copy an artifact within the store; returns the number of objects
    pub fn copy(&self, from: &PathInfo, to: &PathInfo) -> Result<usize> {
        let store = self.writable()?;
        let members = self.members(from)?;
        if members.is_empty() {
            return Err(OutputError::DoesNotExist(from.url.clone()));
        }
        for (key, relative) in &members {
            store.copy(key, &Self::target_key(to, relative))?;
        }
        Ok(members.len())
    }

    fn target_key(to: &PathInfo, relative: &str) -> String {
        let base = to.object_key();
        if relative.is_empty() {
            base
        } else {
            format!("{}/{}", base.trim_end_matches('/'), relative)
        }
    }
}

impl Remote for ObjectRemote {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn exists(&self, info: &PathInfo) -> Result<bool> {
        Ok(!self.members(info)?.is_empty())
    }

    fn save_info(&self, info: &PathInfo) -> Result<Fingerprint> {
        let store = self.store()?;
        let key = info.object_key();
        if let Some(meta) = store.head(&key)? {
            return Ok(Fingerprint::new()
                .with(ETAG_KEY, meta.etag)
                .with(SIZE_KEY, meta.size.to_string()));
        }

        let members = self.members(info)?;
        if members.is_empty() {
            return Err(OutputError::DoesNotExist(info.url.clone()));
        }

        let mut listing = String::new();
        let mut size = 0u64;
        for (key, relative) in &members {
            let meta = store
                .head(key)?
                .ok_or_else(|| OutputError::ObjectNotFound(key.clone()))?;
            listing.push_str(&format!("{} {}\n", relative, meta.etag));
            size += meta.size;
        }
        Ok(Fingerprint::new()
            .with(ETAG_KEY, format!("{}{}", utils::hash_data(listing.as_bytes()), DIR_SUFFIX))
            .with(SIZE_KEY, size.to_string()))
    }

    fn download(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        check_pairs(from, to)?;
        let store = self.store()?;
        for (src, dst) in from.iter().zip(to) {
            let dst_path = dst.fs_path().ok_or_else(|| {
                OutputError::remote(format!("download target '{}' is not local", dst.url))
            })?;
            let members = self.members(src)?;
            if members.is_empty() {
                return Err(OutputError::DoesNotExist(src.url.clone()));
            }
            for (key, relative) in &members {
                let target = utils::join_slash_path(&dst_path, relative);
                utils::atomic_write(&target, &store.get(key)?)?;
                trace!("Downloaded {} -> {:?}", key, target);
            }
            debug!("Downloaded {} ({} objects)", src.url, members.len());
        }
        Ok(())
    }

    fn upload(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        check_pairs(from, to)?;
        let store = self.writable()?;
        for (src, dst) in from.iter().zip(to) {
            let src_path = src.fs_path().ok_or_else(|| {
                OutputError::remote(format!("upload source '{}' is not local", src.url))
            })?;
            if !src_path.exists() {
                return Err(OutputError::DoesNotExist(src.url.clone()));
            }

            if src_path.is_dir() {
                for entry in WalkDir::new(&src_path).follow_links(true) {
                    let entry = entry?;
                    if entry.file_type().is_file() {
                        let relative = utils::relative_slash_path(entry.path(), &src_path)?;
                        store.put(&Self::target_key(dst, &relative), &fs::read(entry.path())?)?;
                    }
                }
            } else {
                store.put(&dst.object_key(), &fs::read(&src_path)?)?;
            }
            debug!("Uploaded {:?} -> {}", src_path, dst.url);
        }
        Ok(())
    }

    fn move_to(&self, from: &PathInfo, to: &PathInfo) -> Result<()> {
        let from_key = from.object_key();
        let to_key = to.object_key();
        if from_key == to_key {
            debug!("{} is already at {}", from.url, to.url);
            return Ok(());
        }
        if to_key.starts_with(&format!("{}/", from_key.trim_end_matches('/'))) {
            return Err(OutputError::MoveIntoItself {
                from: from.url.clone(),
                to: to.url.clone(),
            });
        }

        let members = self.members(from)?;
        let copied = self.copy(from, to)?;
        let store = self.writable()?;
        for (key, _) in &members {
            store.delete(key)?;
        }
        debug!("Moved {} -> {} ({} objects)", from.url, to.url, copied);
        Ok(())
    }

    fn remove(&self, info: &PathInfo) -> Result<()> {
        let store = self.writable()?;
        for (key, _) in self.members(info)? {
            store.delete(&key)?;
        }
        debug!("Removed {}", info.url);
        Ok(())
    }
}

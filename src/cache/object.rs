//! Cache living inside an object store
//!
//! Outputs on object schemes (`s3://...`, `gs://...`) are cached in the same
//! store under a base location, with one entry per distinct entity tag:
//! `<base>/<aa>/<rest>` where `aa` + `rest` is the SHA-256 of the etag.
//! Entries are server-side copies of the artifact (a single object or a whole
//! prefix) and are never rewritten once present.

use crate::cache::Cache;
use crate::error::{OutputError, Result};
use crate::fingerprint::{Fingerprint, ETAG_KEY};
use crate::path_info::{PathInfo, Scheme};
use crate::remote::{ObjectRemote, Remote};
use crate::utils;
use std::path::PathBuf;
use tracing::{debug, info};

/// Object-store cache for one scheme
#[derive(Debug, Clone)]
pub struct ObjectCache {
    remote: ObjectRemote,
    base: PathInfo,
}

impl ObjectCache {
    /// Cache stored below `base` through `remote`
    ///
    /// # Errors
    ///
    /// - [`OutputError::Cache`] if `base` is not on the remote's scheme
    pub fn new(remote: ObjectRemote, base: PathInfo) -> Result<Self> {
        if base.scheme != remote.scheme() {
            return Err(OutputError::cache(format!(
                "cache location '{}' is not a '{}' url",
                base.url,
                remote.scheme()
            )));
        }
        Ok(Self { remote, base })
    }

    /// Base location of the cache
    pub fn base(&self) -> &PathInfo {
        &self.base
    }

    fn entry(&self, etag: &str) -> PathInfo {
        let key = utils::hash_data(etag.as_bytes());
        self.base.join(&format!("{}/{}", &key[..2], &key[2..]))
    }

    fn current(&self, info: &PathInfo) -> Result<Option<Fingerprint>> {
        match self.remote.save_info(info) {
            Ok(fp) => Ok(Some(fp)),
            Err(OutputError::DoesNotExist(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Cache for ObjectCache {
    fn scheme(&self) -> Scheme {
        self.remote.scheme()
    }

    fn changed(&self, info: &PathInfo, recorded: Option<&Fingerprint>) -> Result<bool> {
        let Some(etag) = recorded.and_then(|fp| fp.get(ETAG_KEY)) else {
            return Ok(true);
        };
        if !self.remote.exists(&self.entry(etag))? {
            debug!("Cache for '{}' is missing {}", info.url, etag);
            return Ok(true);
        }
        let current = self.current(info)?;
        Ok(current.as_ref().and_then(|fp| fp.get(ETAG_KEY)) != Some(etag))
    }

    fn save(&self, info: &PathInfo) -> Result<Fingerprint> {
        let fingerprint = self.remote.save_info(info)?;
        let etag = fingerprint
            .get(ETAG_KEY)
            .ok_or_else(|| OutputError::IncompleteFingerprint(ETAG_KEY.to_string()))?;
        let entry = self.entry(etag);

        if !self.remote.exists(&entry)? {
            self.remote.copy(info, &entry)?;
            // The artifact may have been rewritten between fingerprint and copy
            let cached = self.remote.save_info(&entry)?;
            if cached.get(ETAG_KEY) != Some(etag) {
                self.remote.remove(&entry)?;
                return Err(OutputError::HashMismatch {
                    expected: etag.to_string(),
                    actual: cached.get(ETAG_KEY).unwrap_or_default().to_string(),
                });
            }
        }

        info!("Saved '{}' to cache ({})", info.url, fingerprint);
        Ok(fingerprint)
    }

    fn checkout(&self, info: &PathInfo, recorded: &Fingerprint, force: bool) -> Result<()> {
        let etag = recorded
            .get(ETAG_KEY)
            .ok_or_else(|| OutputError::IncompleteFingerprint(ETAG_KEY.to_string()))?;
        let entry = self.entry(etag);
        if !self.remote.exists(&entry)? {
            return Err(OutputError::ObjectNotFound(etag.to_string()));
        }

        if let Some(current) = self.current(info)? {
            if current.get(ETAG_KEY) == Some(etag) {
                debug!("'{}' is up to date", info.url);
                return Ok(());
            }
            if !force {
                return Err(OutputError::CheckoutConflict {
                    path: PathBuf::from(&info.url),
                });
            }
            self.remote.remove(info)?;
        }

        self.remote.copy(&entry, info)?;
        info!("Checked out '{}' ({})", info.url, recorded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryObjectStore, ObjectStore};
    use std::path::Path;
    use std::sync::Arc;

    fn setup() -> (ObjectCache, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let remote = ObjectRemote::new(Scheme::S3, store.clone());
        let base = PathInfo::resolve("s3://bucket/.cache", Path::new("/")).unwrap();
        (ObjectCache::new(remote, base).unwrap(), store)
    }

    fn info(url: &str) -> PathInfo {
        PathInfo::resolve(url, Path::new("/")).unwrap()
    }

    #[test]
    fn test_base_must_match_scheme() {
        let remote = ObjectRemote::new(Scheme::S3, Arc::new(MemoryObjectStore::new()));
        assert!(ObjectCache::new(remote, info("gs://bucket/cache")).is_err());
    }

    #[test]
    fn test_save_changed_checkout() {
        let (cache, store) = setup();
        store.put("bucket/model.pkl", b"v1").unwrap();
        let model = info("s3://bucket/model.pkl");

        let fp = cache.save(&model).unwrap();
        assert_eq!(cache.save(&model).unwrap(), fp);
        assert!(!cache.changed(&model, Some(&fp)).unwrap());

        store.put("bucket/model.pkl", b"v2").unwrap();
        assert!(cache.changed(&model, Some(&fp)).unwrap());
        assert!(matches!(
            cache.checkout(&model, &fp, false),
            Err(OutputError::CheckoutConflict { .. })
        ));

        cache.checkout(&model, &fp, true).unwrap();
        assert_eq!(store.get("bucket/model.pkl").unwrap(), b"v1");
    }

    #[test]
    fn test_prefix_checkout_after_removal() {
        let (cache, store) = setup();
        store.put("bucket/dir/a", b"a").unwrap();
        store.put("bucket/dir/b", b"b").unwrap();
        let dir = info("s3://bucket/dir");

        let fp = cache.save(&dir).unwrap();
        store.delete("bucket/dir/a").unwrap();
        store.delete("bucket/dir/b").unwrap();
        assert!(cache.changed(&dir, Some(&fp)).unwrap());

        cache.checkout(&dir, &fp, false).unwrap();
        assert_eq!(store.get("bucket/dir/b").unwrap(), b"b");
    }
}

//! Caches
//!
//! A cache stores immutable copies of artifact content keyed by fingerprint.
//! Cache-backed outputs delegate three things to the cache registered for
//! their scheme: deciding whether the workspace copy changed, saving the
//! current content, and restoring recorded content into the workspace.
//!
//! [`CacheRegistry`] maps schemes to caches. An output that asks for caching
//! on a scheme with no registered cache is rejected at construction.

mod local;
mod object;

pub use local::{CacheMetadata, CacheStats, LocalCache};
pub use object::ObjectCache;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::path_info::{PathInfo, Scheme};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Content cache for one scheme
pub trait Cache: Send + Sync + fmt::Debug {
    /// Scheme of the artifacts this cache holds
    fn scheme(&self) -> Scheme;

    /// Whether the artifact at `info` differs from `recorded`
    ///
    /// Also true when nothing is recorded or the recorded content is not in
    /// the cache.
    fn changed(&self, info: &PathInfo, recorded: Option<&Fingerprint>) -> Result<bool>;

    /// Store the artifact's current content and return its fingerprint
    ///
    /// Saving identical content twice is a storage no-op and returns an
    /// identical fingerprint.
    fn save(&self, info: &PathInfo) -> Result<Fingerprint>;

    /// Restore `recorded` content at `info`
    ///
    /// A workspace copy that differs from `recorded` is only replaced when
    /// `force` is set.
    fn checkout(&self, info: &PathInfo, recorded: &Fingerprint, force: bool) -> Result<()>;
}

/// Per-scheme cache lookup
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    caches: BTreeMap<Scheme, Arc<dyn Cache>>,
}

impl CacheRegistry {
    /// Registry with no caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its own scheme, replacing any previous one
    pub fn register(&mut self, cache: Arc<dyn Cache>) {
        self.caches.insert(cache.scheme(), cache);
    }

    /// Builder-style register
    pub fn with(mut self, cache: Arc<dyn Cache>) -> Self {
        self.register(cache);
        self
    }

    /// Cache for `scheme`, if one is configured
    pub fn get(&self, scheme: Scheme) -> Option<&Arc<dyn Cache>> {
        self.caches.get(&scheme)
    }

    /// Schemes with a cache
    pub fn schemes(&self) -> impl Iterator<Item = Scheme> + '_ {
        self.caches.keys().copied()
    }

    /// Whether no cache is registered
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

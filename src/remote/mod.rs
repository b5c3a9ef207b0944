//! Remote backends
//!
//! A remote knows how to inspect and move bytes for one URL scheme. Outputs
//! never talk to a filesystem or an object store directly; every existence
//! check, fingerprint, transfer, move and removal goes through the
//! [`Remote`] trait.
//!
//! The set of backends is closed, so dispatch is a plain enum
//! ([`Backend`]) picked once when an output is constructed:
//!
//! - [`Backend::Local`] wraps a [`LocalRemote`] over the local filesystem
//! - every other variant wraps an [`ObjectRemote`] whose bytes live behind an
//!   [`ObjectStore`] transport; `http` remotes are read-only
//!
//! A remote built with empty configuration (see [`Backend::default_for`]) has
//! no transport bound for object schemes and fails its operations with
//! [`OutputError::RemoteNotConfigured`](crate::error::OutputError::RemoteNotConfigured).

mod local;
mod object;

pub use local::LocalRemote;
pub use object::{MemoryObjectStore, ObjectMeta, ObjectRemote, ObjectStore};

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::manifest::TreeHasher;
use crate::path_info::{PathInfo, Scheme};
use std::fmt;
use std::sync::Arc;

/// Operations every backend provides
pub trait Remote: Send + Sync + fmt::Debug {
    /// Scheme this remote serves
    fn scheme(&self) -> Scheme;

    /// Whether the artifact exists
    fn exists(&self, info: &PathInfo) -> Result<bool>;

    /// Current fingerprint of the artifact
    ///
    /// Fails with `DoesNotExist` when the artifact is missing.
    fn save_info(&self, info: &PathInfo) -> Result<Fingerprint>;

    /// Copy artifacts from this remote into `to` (pairwise)
    fn download(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()>;

    /// Copy local artifacts `from` into this remote at `to` (pairwise)
    fn upload(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()>;

    /// Move an artifact within this remote
    fn move_to(&self, from: &PathInfo, to: &PathInfo) -> Result<()>;

    /// Delete an artifact; deleting a missing artifact is not an error
    fn remove(&self, info: &PathInfo) -> Result<()>;
}

/// Closed set of backends an output can be bound to
#[derive(Debug, Clone)]
pub enum Backend {
    /// Local filesystem
    Local(LocalRemote),
    /// Amazon S3
    S3(ObjectRemote),
    /// Google Cloud Storage
    Gs(ObjectRemote),
    /// SSH host
    Ssh(ObjectRemote),
    /// Hadoop filesystem
    Hdfs(ObjectRemote),
    /// HTTP(S), read-only
    Http(ObjectRemote),
}

impl Backend {
    /// Backend for `scheme` built with empty configuration
    pub fn default_for(scheme: Scheme) -> Backend {
        match scheme {
            Scheme::Local => Backend::Local(LocalRemote::default()),
            other => Backend::object(ObjectRemote::unconfigured(other)),
        }
    }

    /// Local backend sharing a tree hasher
    pub fn local(hasher: TreeHasher) -> Backend {
        Backend::Local(LocalRemote::new(hasher))
    }

    /// Object backend for `store`, bound to `scheme`
    pub fn with_store(scheme: Scheme, store: Arc<dyn ObjectStore>) -> Backend {
        match scheme {
            Scheme::Local => Backend::default_for(Scheme::Local),
            other => Backend::object(ObjectRemote::new(other, store)),
        }
    }

    fn object(remote: ObjectRemote) -> Backend {
        match remote.scheme() {
            Scheme::S3 => Backend::S3(remote),
            Scheme::Gs => Backend::Gs(remote),
            Scheme::Ssh => Backend::Ssh(remote),
            Scheme::Hdfs => Backend::Hdfs(remote),
            Scheme::Http | Scheme::Local => Backend::Http(remote),
        }
    }

    /// Whether this backend's scheme claims `url`
    pub fn matches(&self, url: &str) -> bool {
        self.scheme().matches(url)
    }

    /// Backend kind name, used in debug output
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Local(_) => "Local",
            Backend::S3(_) => "S3",
            Backend::Gs(_) => "GS",
            Backend::Ssh(_) => "SSH",
            Backend::Hdfs(_) => "HDFS",
            Backend::Http(_) => "HTTP",
        }
    }

    fn inner(&self) -> &dyn Remote {
        match self {
            Backend::Local(remote) => remote,
            Backend::S3(remote)
            | Backend::Gs(remote)
            | Backend::Ssh(remote)
            | Backend::Hdfs(remote)
            | Backend::Http(remote) => remote,
        }
    }
}

impl Remote for Backend {
    fn scheme(&self) -> Scheme {
        self.inner().scheme()
    }

    fn exists(&self, info: &PathInfo) -> Result<bool> {
        self.inner().exists(info)
    }

    fn save_info(&self, info: &PathInfo) -> Result<Fingerprint> {
        self.inner().save_info(info)
    }

    fn download(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        self.inner().download(from, to)
    }

    fn upload(&self, from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
        self.inner().upload(from, to)
    }

    fn move_to(&self, from: &PathInfo, to: &PathInfo) -> Result<()> {
        self.inner().move_to(from, to)
    }

    fn remove(&self, info: &PathInfo) -> Result<()> {
        self.inner().remove(info)
    }
}

/// Check that transfer lists pair up
pub(crate) fn check_pairs(from: &[PathInfo], to: &[PathInfo]) -> Result<()> {
    if from.len() != to.len() {
        return Err(crate::error::OutputError::remote(format!(
            "transfer lists differ in length: {} sources, {} targets",
            from.len(),
            to.len()
        )));
    }
    Ok(())
}

//! Project context
//!
//! Every [`Output`](crate::output::Output) holds an `Arc<ProjectContext>`: the
//! read-only handle through which it reaches the project root, the cache
//! registered for its scheme, the version-control handle and the named
//! remotes. The context is built once per project, either from the on-disk
//! configuration ([`ProjectContext::open`]) or programmatically
//! ([`ProjectContext::builder`]).

use crate::cache::{Cache, CacheRegistry, LocalCache, ObjectCache};
use crate::compression::CompressionEngine;
use crate::config::{ProjectConfig, PROJECT_DIR};
use crate::error::{OutputError, Result};
use crate::manifest::TreeHasher;
use crate::path_info::{PathInfo, Scheme};
use crate::remote::{Backend, ObjectRemote, ObjectStore};
use crate::scm::{self, Scm};
use crate::state::StateIndex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const STATE_FILE: &str = "state.bin";

/// Shared, read-only view of a project
pub struct ProjectContext {
    root: PathBuf,
    config: ProjectConfig,
    caches: CacheRegistry,
    scm: Arc<dyn Scm>,
    hasher: TreeHasher,
    stores: BTreeMap<Scheme, Arc<dyn ObjectStore>>,
}

impl fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("root", &self.root)
            .field("caches", &self.caches.schemes().collect::<Vec<_>>())
            .field("scm", &self.scm)
            .finish()
    }
}

impl ProjectContext {
    /// Open the project at `root` using its configuration file
    ///
    /// Hash state is persisted under `.outtrack/` and the SCM is detected
    /// from the working tree.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config = ProjectConfig::load(root)?;
        Self::builder(root).config(config).persistent_state().build()
    }

    /// Start building a context for `root`
    pub fn builder(root: impl Into<PathBuf>) -> ProjectContextBuilder {
        ProjectContextBuilder::new(root.into())
    }

    /// Create the project directory with a default configuration
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config_path = ProjectConfig::path(root);
        if !config_path.exists() {
            ProjectConfig::default().save(root)?;
            info!("Initialized project at {:?}", root);
        }
        Self::open(root)
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project metadata directory
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Loaded configuration
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Caches by scheme
    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Version-control handle
    pub fn scm(&self) -> &dyn Scm {
        self.scm.as_ref()
    }

    /// Named remotes for `remote://` aliases
    pub fn remotes(&self) -> &BTreeMap<String, String> {
        &self.config.remotes
    }

    /// Hasher shared by the local remote and the local cache
    pub fn hasher(&self) -> &TreeHasher {
        &self.hasher
    }

    /// Remote used for `scheme` when an output does not bring its own
    pub fn default_remote(&self, scheme: Scheme) -> Backend {
        match (scheme, self.stores.get(&scheme)) {
            (Scheme::Local, _) => Backend::local(self.hasher.clone()),
            (_, Some(store)) => Backend::with_store(scheme, store.clone()),
            (_, None) => Backend::default_for(scheme),
        }
    }

    /// Write remembered hashes to disk
    pub fn persist_state(&self) -> Result<()> {
        self.hasher.state().persist()
    }
}

/// Builder for [`ProjectContext`]
pub struct ProjectContextBuilder {
    root: PathBuf,
    config: ProjectConfig,
    scm: Option<Arc<dyn Scm>>,
    stores: BTreeMap<Scheme, Arc<dyn ObjectStore>>,
    caches: Vec<Arc<dyn Cache>>,
    persistent_state: bool,
}

impl ProjectContextBuilder {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: ProjectConfig::default(),
            scm: None,
            stores: BTreeMap::new(),
            caches: Vec::new(),
            persistent_state: false,
        }
    }

    /// Use `config` instead of the default configuration
    pub fn config(mut self, config: ProjectConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `scm` instead of detecting it from the working tree
    pub fn scm(mut self, scm: Arc<dyn Scm>) -> Self {
        self.scm = Some(scm);
        self
    }

    /// Bind a transport for an object scheme
    pub fn object_store(mut self, scheme: Scheme, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(scheme, store);
        self
    }

    /// Register an extra cache, replacing the configured one for its scheme
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.caches.push(cache);
        self
    }

    /// Persist hash state under the project directory
    pub fn persistent_state(mut self) -> Self {
        self.persistent_state = true;
        self
    }

    /// Build the context, opening every configured cache
    ///
    /// # Errors
    ///
    /// - [`OutputError::DoesNotExist`] if the root directory is missing
    /// - [`OutputError::InvalidConfiguration`] if the configuration is invalid
    pub fn build(self) -> Result<ProjectContext> {
        if !self.root.is_dir() {
            return Err(OutputError::DoesNotExist(self.root.display().to_string()));
        }
        let root = fs::canonicalize(&self.root)?;
        self.config.validate()?;

        let state = if self.persistent_state {
            StateIndex::open(root.join(PROJECT_DIR).join(STATE_FILE))
        } else {
            StateIndex::in_memory()
        };
        let hasher = TreeHasher::with_jobs(Arc::new(state), self.config.jobs)?;

        let mut caches = CacheRegistry::new();
        if let Some(dir) = self.config.local_cache_dir(&root) {
            let compression = CompressionEngine::new(self.config.compression);
            caches.register(Arc::new(LocalCache::open(dir, compression, hasher.clone())?));
        }
        for scheme in Scheme::ALL {
            let Some(url) = self.config.cache_url(scheme)? else {
                continue;
            };
            let remote = match self.stores.get(&scheme) {
                Some(store) => ObjectRemote::new(scheme, store.clone()),
                None => ObjectRemote::unconfigured(scheme),
            };
            let base = PathInfo::resolve(&url, &root)?;
            caches.register(Arc::new(ObjectCache::new(remote, base)?));
        }
        for cache in self.caches {
            caches.register(cache);
        }

        let scm = self.scm.unwrap_or_else(|| Arc::from(scm::detect(&root)));
        debug!(
            "Project context at {:?}: caches {:?}",
            root,
            caches.schemes().collect::<Vec<_>>()
        );

        Ok(ProjectContext {
            root,
            config: self.config,
            caches,
            scm,
            hasher,
            stores: self.stores,
        })
    }
}

/// Find the project root containing `start`
///
/// Walks up from `start` until a directory holding `.outtrack/` is found.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    let start = fs::canonicalize(start)?;
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_DIR).is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            OutputError::InvalidConfiguration(format!(
                "{:?} is not inside a project (no {} directory found)",
                start, PROJECT_DIR
            ))
        })
}

//! Tracked outputs
//!
//! An [`Output`] is one artifact a pipeline stage produces (or, with
//! [`Role::Dependency`], consumes). It binds a declared location to the
//! remote backend for its scheme and, when cache-backed, to the cache
//! registered for that scheme in the [`ProjectContext`].
//!
//! ## Lifecycle
//!
//! ```text
//! new / loadd ──► changed? ──► save ──► dumpd
//!                    │
//!                    └──► checkout(force) / move_to / remove
//! ```
//!
//! - `save` records the artifact's fingerprint (storing the content in the
//!   cache when cache-backed)
//! - `changed` compares the workspace against the recorded fingerprint
//! - `checkout` restores recorded content from the cache
//! - `move_to` and `remove` keep the version-control ignore list in sync for
//!   cache-backed local outputs
//!
//! ## Example
//!
//! ```rust,no_run
//! use outtrack::{Output, ProjectContext};
//! use std::sync::Arc;
//!
//! # fn example() -> outtrack::Result<()> {
//! let ctx = Arc::new(ProjectContext::open(".")?);
//! let mut out = Output::builder(ctx, "data/train.csv").build()?;
//! if out.changed()? {
//!     out.save()?;
//! }
//! println!("{}", serde_json::Value::Object(out.dumpd()));
//! # Ok(())
//! # }
//! ```

mod factory;
mod serialize;

pub use factory::OutputFactory;
pub use serialize::{PARAM_CACHE, PARAM_METRIC, PARAM_PATH};

use crate::cache::Cache;
use crate::context::ProjectContext;
use crate::error::{OutputError, Result};
use crate::fingerprint::Fingerprint;
use crate::metric::Metric;
use crate::path_info::{expand_remote_alias, PathInfo, Scheme};
use crate::remote::{Backend, Remote};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether an artifact is produced or consumed by its stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Role {
    /// Produced by the stage
    #[default]
    Output,
    /// Consumed by the stage; never cached, never a metric
    Dependency,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Output => "Output",
            Role::Dependency => "Dependency",
        }
    }
}

/// Declared location plus its resolved form, always replaced together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Location as declared (persisted as `path`)
    pub url: String,
    /// Resolved location
    pub path_info: PathInfo,
}

/// Detailed status of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Workspace matches the recorded fingerprint
    Unchanged,
    /// Artifact does not exist
    Missing,
    /// Artifact differs from the recorded fingerprint
    Modified,
    /// Artifact exists but nothing was recorded yet
    New,
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OutputStatus::Unchanged => "unchanged",
            OutputStatus::Missing => "deleted",
            OutputStatus::Modified => "modified",
            OutputStatus::New => "new",
        };
        f.write_str(text)
    }
}

/// Construction options for [`Output::new`]
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Previously recorded fingerprint
    pub info: Option<Fingerprint>,
    /// Backend to use instead of the context's default for the scheme
    pub remote: Option<Backend>,
    /// Whether content is stored in the cache
    pub cache: bool,
    /// Metric descriptor
    pub metric: Metric,
    /// Output or dependency
    pub role: Role,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            info: None,
            remote: None,
            cache: true,
            metric: Metric::NotAMetric,
            role: Role::Output,
        }
    }
}

/// A tracked artifact
pub struct Output {
    identity: Identity,
    ctx: Arc<ProjectContext>,
    remote: Backend,
    info: Option<Fingerprint>,
    use_cache: bool,
    metric: Metric,
    role: Role,
}

impl Output {
    /// Bind `url` to its backend
    ///
    /// `remote://<name>/...` aliases are expanded through the context, the
    /// scheme is resolved from the url, and dependencies are forced to
    /// `cache = false` and no metric.
    ///
    /// # Errors
    ///
    /// - [`OutputError::UnsupportedUrl`] if no scheme claims the url
    /// - [`OutputError::UnknownRemote`] for an alias of an unknown remote
    /// - [`OutputError::Configuration`] if caching is requested but no cache
    ///   is registered for the scheme; raised before any backend call
    pub fn new(ctx: Arc<ProjectContext>, url: impl Into<String>, options: OutputOptions) -> Result<Self> {
        let url = url.into();
        let expanded = expand_remote_alias(&url, ctx.remotes())?;
        let scheme = Scheme::detect(&expanded).ok_or_else(|| OutputError::UnsupportedUrl(url.clone()))?;

        let (use_cache, metric) = match options.role {
            Role::Dependency => (false, Metric::NotAMetric),
            Role::Output => (options.cache, options.metric.normalized()),
        };
        if use_cache && ctx.caches().get(scheme).is_none() {
            return Err(OutputError::configuration(scheme.as_str()));
        }

        let remote = match options.remote {
            Some(remote) if remote.scheme() != scheme => {
                return Err(OutputError::remote(format!(
                    "'{}' remote cannot serve '{}'",
                    remote.scheme(),
                    url
                )));
            }
            Some(remote) => remote,
            None => ctx.default_remote(scheme),
        };
        let path_info = PathInfo::resolve_as(scheme, &expanded, ctx.root())?;

        Ok(Self {
            identity: Identity { url, path_info },
            ctx,
            remote,
            info: options.info.filter(|fp| !fp.is_empty()),
            use_cache,
            metric,
            role: options.role,
        })
    }

    /// Fluent construction
    pub fn builder(ctx: Arc<ProjectContext>, url: impl Into<String>) -> OutputBuilder {
        OutputBuilder {
            ctx,
            url: url.into(),
            options: OutputOptions::default(),
        }
    }

    /// Whether some backend claims `url`
    pub fn supported(url: &str) -> bool {
        Scheme::detect(url).is_some()
    }

    /// Declared location
    pub fn url(&self) -> &str {
        &self.identity.url
    }

    /// Resolved location
    pub fn path_info(&self) -> &PathInfo {
        &self.identity.path_info
    }

    /// Location as one value
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Backend-specific path
    pub fn path(&self) -> &str {
        &self.identity.path_info.path
    }

    /// Path separator of the backend
    pub fn sep(&self) -> char {
        self.identity.path_info.sep()
    }

    /// Resolved scheme
    pub fn scheme(&self) -> Scheme {
        self.identity.path_info.scheme
    }

    /// Recorded fingerprint, `None` until the first save
    pub fn info(&self) -> Option<&Fingerprint> {
        self.info.as_ref()
    }

    /// Whether content is stored in the cache
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Metric descriptor
    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Output or dependency
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this is a dependency
    pub fn is_dependency(&self) -> bool {
        self.role == Role::Dependency
    }

    /// Bound backend
    pub fn remote(&self) -> &Backend {
        &self.remote
    }

    /// Project this output belongs to
    pub fn context(&self) -> &Arc<ProjectContext> {
        &self.ctx
    }

    /// Whether the artifact is a local path inside the project root
    pub fn is_local(&self) -> bool {
        self.identity
            .path_info
            .fs_path()
            .is_some_and(|path| path.starts_with(self.ctx.root()))
    }

    /// Whether the artifact exists
    pub fn exists(&self) -> Result<bool> {
        self.remote.exists(&self.identity.path_info)
    }

    fn cache(&self) -> Result<&Arc<dyn Cache>> {
        self.ctx
            .caches()
            .get(self.scheme())
            .ok_or_else(|| OutputError::configuration(self.scheme().as_str()))
    }

    /// Local path whose ignore entry this output manages, if any
    fn ignored_path(&self) -> Option<PathBuf> {
        if self.use_cache && self.is_local() {
            self.identity.path_info.fs_path()
        } else {
            None
        }
    }

    /// Whether the artifact differs from what was recorded
    ///
    /// Always true for a missing artifact.
    pub fn changed(&self) -> Result<bool> {
        if !self.exists()? {
            debug!("'{}' does not exist", self.url());
            return Ok(true);
        }

        if !self.use_cache {
            let current = self.remote.save_info(&self.identity.path_info)?;
            return Ok(self.info.as_ref() != Some(&current));
        }

        self.cache()?.changed(&self.identity.path_info, self.info.as_ref())
    }

    /// `{display name: "changed"}` when changed, empty otherwise
    pub fn status(&self) -> Result<BTreeMap<String, String>> {
        let mut status = BTreeMap::new();
        if self.changed()? {
            status.insert(self.to_string(), "changed".to_string());
        }
        Ok(status)
    }

    /// Why the output is (or is not) changed
    pub fn status_detail(&self) -> Result<OutputStatus> {
        if !self.exists()? {
            return Ok(OutputStatus::Missing);
        }
        if self.info.is_none() {
            return Ok(OutputStatus::New);
        }
        if self.changed()? {
            Ok(OutputStatus::Modified)
        } else {
            Ok(OutputStatus::Unchanged)
        }
    }

    /// Check that the artifact can be tracked
    ///
    /// # Errors
    ///
    /// - [`OutputError::DoesNotExist`] if the artifact is missing
    /// - [`OutputError::IsNotFileOrDir`] for a local special file
    /// - [`OutputError::AlreadyTracked`] if version control already tracks a
    ///   cache-backed local artifact
    pub fn verify(&self) -> Result<()> {
        if !self.exists()? {
            return Err(OutputError::DoesNotExist(self.url().to_string()));
        }

        if let Some(path) = self.identity.path_info.fs_path() {
            let metadata = fs::metadata(&path)?;
            if !metadata.is_file() && !metadata.is_dir() {
                return Err(OutputError::IsNotFileOrDir(self.url().to_string()));
            }
        }

        if let Some(path) = self.ignored_path() {
            if self.ctx.scm().is_tracked(&path)? {
                return Err(OutputError::AlreadyTracked(self.url().to_string()));
            }
        }
        Ok(())
    }

    /// Record the artifact's current fingerprint
    ///
    /// Cache-backed outputs store the content in the cache. The recorded
    /// fingerprint is only replaced when this succeeds.
    pub fn save(&mut self) -> Result<()> {
        let fingerprint = if self.use_cache {
            self.cache()?.save(&self.identity.path_info)?
        } else {
            self.remote.save_info(&self.identity.path_info)?
        };
        debug!("Saved '{}': {}", self.url(), fingerprint);
        self.info = Some(fingerprint);
        Ok(())
    }

    /// Restore recorded content from the cache
    ///
    /// Does nothing for outputs that are not cache-backed or have nothing
    /// recorded.
    pub fn checkout(&self, force: bool) -> Result<()> {
        if !self.use_cache {
            debug!("'{}' is not cached, nothing to check out", self.url());
            return Ok(());
        }
        let Some(info) = &self.info else {
            debug!("'{}' has no recorded fingerprint, nothing to check out", self.url());
            return Ok(());
        };
        self.cache()?.checkout(&self.identity.path_info, info, force)
    }

    /// Copy the artifact to `to`
    pub fn download(&self, to: &PathInfo) -> Result<()> {
        self.remote
            .download(std::slice::from_ref(&self.identity.path_info), std::slice::from_ref(to))
    }

    /// Move the artifact to the location of `out`
    ///
    /// On failure of the physical move the identity and recorded fingerprint
    /// are left as they were.
    pub fn move_to(&mut self, out: &Output) -> Result<()> {
        let old_ignored = self.ignored_path();
        if let Some(path) = &old_ignored {
            self.ctx.scm().ignore_remove(path)?;
        }

        if let Err(e) = self
            .remote
            .move_to(&self.identity.path_info, &out.identity.path_info)
        {
            if let Some(path) = &old_ignored {
                if let Err(scm_err) = self.ctx.scm().ignore(path) {
                    warn!("Failed to restore ignore entry for {:?}: {}", path, scm_err);
                }
            }
            return Err(e);
        }

        self.identity = out.identity.clone();
        self.save()?;

        if let Some(path) = self.ignored_path() {
            self.ctx.scm().ignore(&path)?;
        }
        debug!("Moved output to '{}'", self.url());
        Ok(())
    }

    /// Delete the artifact
    ///
    /// With `ignore_remove`, a cache-backed local output also drops its
    /// ignore entry.
    pub fn remove(&self, ignore_remove: bool) -> Result<()> {
        self.remote.remove(&self.identity.path_info)?;
        if self.scheme() != Scheme::Local {
            return Ok(());
        }

        if ignore_remove {
            if let Some(path) = self.ignored_path() {
                self.ctx.scm().ignore_remove(&path)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity.url)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = if self.identity.url.is_empty() {
            "No url"
        } else {
            &self.identity.url
        };
        write!(f, "{}{}: '{}'", self.remote.kind(), self.role.name(), url)
    }
}

/// Fluent builder for [`Output`]
pub struct OutputBuilder {
    ctx: Arc<ProjectContext>,
    url: String,
    options: OutputOptions,
}

impl OutputBuilder {
    /// Previously recorded fingerprint
    pub fn info(mut self, info: Fingerprint) -> Self {
        self.options.info = Some(info);
        self
    }

    /// Use a specific backend
    pub fn remote(mut self, remote: Backend) -> Self {
        self.options.remote = Some(remote);
        self
    }

    /// Whether content is stored in the cache (default true)
    pub fn cache(mut self, cache: bool) -> Self {
        self.options.cache = cache;
        self
    }

    /// Metric descriptor
    pub fn metric(mut self, metric: Metric) -> Self {
        self.options.metric = metric;
        self
    }

    /// Output or dependency
    pub fn role(mut self, role: Role) -> Self {
        self.options.role = role;
        self
    }

    /// Build the output
    pub fn build(self) -> Result<Output> {
        Output::new(self.ctx, self.url, self.options)
    }
}

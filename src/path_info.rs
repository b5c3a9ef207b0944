//! URL resolution for declared artifact locations
//!
//! An output is declared with a location string which is either a bare
//! filesystem path (`data/train.csv`) or a URL for one of the supported remote
//! kinds (`s3://bucket/key`, `ssh://user@host:/path`, ...). This module turns
//! that string into a [`Scheme`] plus a backend-specific [`PathInfo`].
//!
//! ## URL patterns
//!
//! | Scheme | Pattern |
//! |--------|---------|
//! | `s3`    | `s3://<bucket>/<key>` |
//! | `gs`    | `gs://<bucket>/<key>` |
//! | `ssh`   | `ssh://[user@]host:<path>` |
//! | `hdfs`  | `hdfs://[user@]<host>/<path>` |
//! | `http`  | `http(s)://...` |
//! | `local` | anything without a `<scheme>://` prefix |
//!
//! Locations of the form `remote://<name>/<path>` are aliases for a named
//! remote from the project configuration and are expanded with
//! [`expand_remote_alias`] before matching.

use crate::error::{OutputError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const S3_PATTERN: &str = r"^s3://(?P<bucket>[^/]+)/?(?P<path>.*)$";
const GS_PATTERN: &str = r"^gs://(?P<bucket>[^/]+)/?(?P<path>.*)$";
const SSH_PATTERN: &str = r"^ssh://((?P<user>[^@]*)@)?(?P<host>[^/:]*):(?P<path>.*)$";
const HDFS_PATTERN: &str = r"^hdfs://((?P<user>[^@]*)@)?(?P<host>[^/]*)(?P<path>/.*)?$";
const HTTP_PATTERN: &str = r"^https?://(?P<host>[^/]+)(?P<path>/.*)?$";
const ANY_URL_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9+.\-]*://";
const REMOTE_ALIAS_PATTERN: &str = r"^remote://(?P<name>[^/]+)/?(?P<path>.*)$";

/// Backend kind implied by a location's prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Local filesystem path
    Local,
    /// Amazon S3 (or compatible) object store
    S3,
    /// Google Cloud Storage
    Gs,
    /// Remote host over SSH
    Ssh,
    /// Hadoop filesystem
    Hdfs,
    /// Plain HTTP(S) location (read-only)
    Http,
}

impl Scheme {
    /// All schemes in matching order; `Local` is the fallback and comes last
    pub const ALL: [Scheme; 6] = [
        Scheme::S3,
        Scheme::Gs,
        Scheme::Ssh,
        Scheme::Hdfs,
        Scheme::Http,
        Scheme::Local,
    ];

    /// Scheme identifier string, as used in configuration keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Local => "local",
            Scheme::S3 => "s3",
            Scheme::Gs => "gs",
            Scheme::Ssh => "ssh",
            Scheme::Hdfs => "hdfs",
            Scheme::Http => "http",
        }
    }

    /// Parse a scheme identifier string
    pub fn from_name(name: &str) -> Option<Scheme> {
        match name {
            "local" => Some(Scheme::Local),
            "s3" => Some(Scheme::S3),
            "gs" => Some(Scheme::Gs),
            "ssh" => Some(Scheme::Ssh),
            "hdfs" => Some(Scheme::Hdfs),
            "http" | "https" => Some(Scheme::Http),
            _ => None,
        }
    }

    /// Whether this scheme claims the given url
    pub fn matches(&self, url: &str) -> bool {
        match self.pattern() {
            Some(re) => re.is_match(url),
            None => !any_url().is_match(url),
        }
    }

    /// Resolve the scheme of a url, `None` if no scheme claims it
    pub fn detect(url: &str) -> Option<Scheme> {
        Scheme::ALL.into_iter().find(|scheme| scheme.matches(url))
    }

    fn pattern(&self) -> Option<&'static Regex> {
        static S3: OnceLock<Regex> = OnceLock::new();
        static GS: OnceLock<Regex> = OnceLock::new();
        static SSH: OnceLock<Regex> = OnceLock::new();
        static HDFS: OnceLock<Regex> = OnceLock::new();
        static HTTP: OnceLock<Regex> = OnceLock::new();

        let (cell, pattern) = match self {
            Scheme::Local => return None,
            Scheme::S3 => (&S3, S3_PATTERN),
            Scheme::Gs => (&GS, GS_PATTERN),
            Scheme::Ssh => (&SSH, SSH_PATTERN),
            Scheme::Hdfs => (&HDFS, HDFS_PATTERN),
            Scheme::Http => (&HTTP, HTTP_PATTERN),
        };
        Some(cell.get_or_init(|| compile(pattern)))
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Patterns are compile-time constants covered by tests.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in url pattern must compile")
}

fn any_url() -> &'static Regex {
    static ANY: OnceLock<Regex> = OnceLock::new();
    ANY.get_or_init(|| compile(ANY_URL_PATTERN))
}

fn remote_alias() -> &'static Regex {
    static ALIAS: OnceLock<Regex> = OnceLock::new();
    ALIAS.get_or_init(|| compile(REMOTE_ALIAS_PATTERN))
}

/// Backend-specific decomposition of a declared location
///
/// `PathInfo` is derived from a url and never persisted. For local paths
/// `path` is absolute (relative declarations are joined with the project
/// root); for object stores it is the key inside `bucket`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathInfo {
    /// Resolved scheme
    pub scheme: Scheme,
    /// Path inside the backend (absolute filesystem path for local)
    pub path: String,
    /// Bucket for object stores
    pub bucket: Option<String>,
    /// Host for ssh, hdfs and http
    pub host: Option<String>,
    /// User for ssh and hdfs
    pub user: Option<String>,
    /// The url this info was derived from
    pub url: String,
}

impl PathInfo {
    /// Resolve a url into path info
    ///
    /// `root` is used to anchor relative local paths. Aliases must already be
    /// expanded (see [`expand_remote_alias`]).
    ///
    /// # Errors
    ///
    /// - [`OutputError::UnsupportedUrl`] if no scheme claims the url
    pub fn resolve(url: &str, root: &Path) -> Result<Self> {
        let scheme = Scheme::detect(url).ok_or_else(|| OutputError::UnsupportedUrl(url.to_string()))?;
        Self::resolve_as(scheme, url, root)
    }

    /// Resolve a url with an already known scheme
    pub fn resolve_as(scheme: Scheme, url: &str, root: &Path) -> Result<Self> {
        let mut info = PathInfo {
            scheme,
            path: String::new(),
            bucket: None,
            host: None,
            user: None,
            url: url.to_string(),
        };

        let Some(re) = scheme.pattern() else {
            let declared = Path::new(url);
            let absolute = if declared.is_absolute() {
                declared.to_path_buf()
            } else {
                root.join(declared)
            };
            info.path = normalize(&absolute).to_string_lossy().into_owned();
            return Ok(info);
        };

        let caps = re
            .captures(url)
            .ok_or_else(|| OutputError::UnsupportedUrl(url.to_string()))?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        info.bucket = group("bucket");
        info.user = group("user").filter(|u| !u.is_empty());
        info.host = group("host").filter(|h| !h.is_empty());
        info.path = match scheme {
            Scheme::Http => url.to_string(),
            _ => group("path").unwrap_or_default(),
        };
        Ok(info)
    }

    /// Whether this info points at the local filesystem
    pub fn is_local(&self) -> bool {
        self.scheme == Scheme::Local
    }

    /// Filesystem path for local infos
    pub fn fs_path(&self) -> Option<PathBuf> {
        self.is_local().then(|| PathBuf::from(&self.path))
    }

    /// Object key for object-store style infos (`bucket/key` without scheme)
    pub fn object_key(&self) -> String {
        match &self.bucket {
            Some(bucket) if self.path.is_empty() => bucket.clone(),
            Some(bucket) => format!("{}/{}", bucket, self.path),
            None => match &self.host {
                Some(host) if self.scheme != Scheme::Http => format!("{}/{}", host, self.path.trim_start_matches('/')),
                _ => self.path.clone(),
            },
        }
    }

    /// Path separator used by this backend
    pub fn sep(&self) -> char {
        '/'
    }

    /// Child info for a relative entry name
    pub fn join(&self, relative: &str) -> PathInfo {
        let mut child = self.clone();
        if self.is_local() {
            child.path = Path::new(&self.path).join(relative).to_string_lossy().into_owned();
        } else if self.path.is_empty() || self.path.ends_with(self.sep()) {
            child.path = format!("{}{}", self.path, relative);
        } else {
            child.path = format!("{}{}{}", self.path, self.sep(), relative);
        }
        child.url = format!("{}{}{}", self.url.trim_end_matches('/'), self.sep(), relative);
        child
    }
}

impl fmt::Display for PathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Expand a `remote://<name>/<path>` alias using the configured remotes
///
/// Locations that are not aliases are returned unchanged.
///
/// # Errors
///
/// - [`OutputError::UnknownRemote`] if the alias names an unconfigured remote
pub fn expand_remote_alias(url: &str, remotes: &BTreeMap<String, String>) -> Result<String> {
    let Some(caps) = remote_alias().captures(url) else {
        return Ok(url.to_string());
    };
    let name = &caps["name"];
    let rest = &caps["path"];
    let base = remotes
        .get(name)
        .ok_or_else(|| OutputError::UnknownRemote(name.to_string()))?;

    if rest.is_empty() {
        return Ok(base.clone());
    }
    let sep = if Scheme::detect(base) == Some(Scheme::Local) {
        std::path::MAIN_SEPARATOR
    } else {
        '/'
    };
    Ok(format!("{}{}{}", base.trim_end_matches(['/', sep]), sep, rest))
}

/// Lexically normalize a path (drop `.` and resolve `..` without touching the fs)
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

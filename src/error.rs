//! Error types for the outtrack library
//!
//! Every failure an [`Output`](crate::output::Output) can report is a distinct
//! variant of [`OutputError`], so callers such as a stage engine or a CLI can
//! branch on the kind and print an actionable message instead of a raw failure.
//! The four named kinds are:
//!
//! - [`OutputError::Configuration`]: caching was requested for a scheme that has
//!   no cache configured. Raised at construction and never retried.
//! - [`OutputError::DoesNotExist`]: the artifact is missing where it must exist.
//! - [`OutputError::IsNotFileOrDir`]: the artifact is neither a regular file nor a
//!   directory.
//! - [`OutputError::AlreadyTracked`]: the artifact is already tracked by the
//!   primary version-control system.
//!
//! Errors coming out of a remote backend or a cache are propagated unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the outtrack library
pub type Result<T> = std::result::Result<T, OutputError>;

/// Main error type for all outtrack operations
#[derive(Debug, Error)]
pub enum OutputError {
    /// Cache requested but not configured for the resolved scheme
    #[error("no cache location setup for '{scheme}' outputs.")]
    Configuration {
        /// Scheme of the output that asked for a cache
        scheme: String,
    },

    /// Artifact is missing where existence was required
    #[error("output '{0}' does not exist")]
    DoesNotExist(String),

    /// Artifact is neither a regular file nor a directory
    #[error("output '{0}' is not a file or directory")]
    IsNotFileOrDir(String),

    /// Artifact is already tracked by the primary version-control system
    #[error("output '{0}' is already tracked by scm (e.g. git)")]
    AlreadyTracked(String),

    /// No output variant claims the given URL
    #[error("unsupported output url: '{0}'")]
    UnsupportedUrl(String),

    /// A `remote://name/...` url refers to an unknown remote
    #[error("remote '{0}' is not configured")]
    UnknownRemote(String),

    /// A persisted pipeline entry could not be turned into an output
    #[error("invalid output entry: {0}")]
    InvalidEntry(String),

    /// Metric descriptor does not match the metric schema
    #[error("invalid metric descriptor: {0}")]
    InvalidMetric(String),

    /// Checkout would overwrite a locally modified copy
    #[error("checkout of '{path:?}' would overwrite local modifications, use force to override")]
    CheckoutConflict {
        /// Workspace path that differs from the recorded fingerprint
        path: PathBuf,
    },

    /// Move target lies inside the artifact being moved
    #[error("cannot move '{from}' into itself ('{to}')")]
    MoveIntoItself {
        /// Artifact being moved
        from: String,
        /// Requested destination
        to: String,
    },

    /// Cache object referenced by a fingerprint is missing
    #[error("cache object not found: {0}")]
    ObjectNotFound(String),

    /// Fingerprint lacks the fields a cache needs
    #[error("fingerprint is missing '{0}'")]
    IncompleteFingerprint(String),

    /// Cached content no longer matches its address
    #[error("hash mismatch - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Expected hash value
        expected: String,
        /// Actual computed hash value
        actual: String,
    },

    /// A remote backend has no transport bound to it
    #[error("remote for '{scheme}' is not configured with a transport")]
    RemoteNotConfigured {
        /// Scheme of the unbound remote
        scheme: String,
    },

    /// Remote backend failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Version control failure
    #[error("SCM error: {0}")]
    Scm(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Invalid configuration file content
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bincode::error::DecodeError> for OutputError {
    fn from(err: bincode::error::DecodeError) -> Self {
        OutputError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for OutputError {
    fn from(err: bincode::error::EncodeError) -> Self {
        OutputError::Bincode(err.to_string())
    }
}

impl OutputError {
    /// Create a configuration error for a scheme without cache
    pub fn configuration(scheme: impl Into<String>) -> Self {
        OutputError::Configuration { scheme: scheme.into() }
    }

    /// Create a remote error with a custom message
    pub fn remote(msg: impl Into<String>) -> Self {
        OutputError::Remote(msg.into())
    }

    /// Create a cache error with a custom message
    pub fn cache(msg: impl Into<String>) -> Self {
        OutputError::Cache(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        OutputError::Internal(msg.into())
    }

    /// Check if this error is a fatal configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OutputError::Configuration { .. }
                | OutputError::UnknownRemote(_)
                | OutputError::InvalidConfiguration(_)
                | OutputError::RemoteNotConfigured { .. }
        )
    }

    /// Check if this error is caused by the state of the user's workspace
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            OutputError::DoesNotExist(_)
                | OutputError::IsNotFileOrDir(_)
                | OutputError::AlreadyTracked(_)
                | OutputError::CheckoutConflict { .. }
                | OutputError::MoveIntoItself { .. }
        )
    }

    /// Check if this error indicates cache corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            OutputError::HashMismatch { .. } | OutputError::Decompression(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            OutputError::Configuration { scheme } => format!(
                "No cache is configured for '{}' outputs. Add a 'cache.{}' entry to the project config \
                 or declare the output with caching disabled.",
                scheme, scheme
            ),
            OutputError::DoesNotExist(path) => format!(
                "Output '{}' does not exist. Make sure the command that produces it ran successfully.",
                path
            ),
            OutputError::IsNotFileOrDir(path) => format!(
                "Output '{}' is not a file or directory. Only regular files and directories can be tracked.",
                path
            ),
            OutputError::AlreadyTracked(path) => format!(
                "Output '{}' is already tracked by git. Remove it from git (e.g. 'git rm -r --cached {}') \
                 before tracking it with outtrack.",
                path, path
            ),
            OutputError::CheckoutConflict { path } => format!(
                "{:?} has local modifications. Commit them with 'outtrack add' or re-run checkout with --force.",
                path
            ),
            OutputError::UnknownRemote(name) => format!(
                "Remote '{}' is not configured. Add it to the 'remotes' section of the project config.",
                name
            ),
            _ => self.to_string(),
        }
    }
}

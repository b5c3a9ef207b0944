//! Version control integration
//!
//! Cache-backed local outputs must not be committed to the primary
//! version-control system; the cache owns their content. The [`Scm`] handle
//! keeps the ignore file next to each such output in sync as outputs are
//! created, moved and removed.

use crate::error::{OutputError, Result};
use crate::utils;
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

const GITIGNORE: &str = ".gitignore";

/// Ignore-list operations of a version-control system
pub trait Scm: Send + Sync + fmt::Debug {
    /// Add `path` to the ignore list
    fn ignore(&self, path: &Path) -> Result<()>;

    /// Remove `path` from the ignore list
    fn ignore_remove(&self, path: &Path) -> Result<()>;

    /// Whether `path` is already tracked
    fn is_tracked(&self, path: &Path) -> Result<bool>;
}

/// No version control: every operation is a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScm;

impl Scm for NoScm {
    fn ignore(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn ignore_remove(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn is_tracked(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

/// Git working tree
///
/// Ignore entries are written as `/<name>` into the `.gitignore` of the
/// output's parent directory.
#[derive(Debug)]
pub struct Git {
    root: PathBuf,
    lock: Mutex<()>,
}

impl Git {
    /// Git handle for the working tree at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    /// Whether `root` is the top of a git working tree
    pub fn is_repo(root: &Path) -> bool {
        root.join(".git").exists()
    }

    /// Working tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_for(path: &Path) -> Result<(PathBuf, String)> {
        let name = path
            .file_name()
            .ok_or_else(|| OutputError::Scm(format!("cannot ignore {:?}: no file name", path)))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok((dir.join(GITIGNORE), format!("/{}", name.to_string_lossy())))
    }

    fn read_lines(gitignore: &Path) -> Result<Vec<String>> {
        match fs::read_to_string(gitignore) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick the SCM handle for a project root
pub fn detect(root: &Path) -> Box<dyn Scm> {
    if Git::is_repo(root) {
        Box::new(Git::new(root))
    } else {
        Box::new(NoScm)
    }
}

impl Scm for Git {
    fn ignore(&self, path: &Path) -> Result<()> {
        let (gitignore, entry) = Self::entry_for(path)?;
        let _guard = self.lock.lock();

        let mut lines = Self::read_lines(&gitignore)?;
        if lines.iter().any(|line| line.trim() == entry) {
            trace!("{:?} already lists '{}'", gitignore, entry);
            return Ok(());
        }
        lines.push(entry.clone());

        let mut content = lines.join("\n");
        content.push('\n');
        utils::atomic_write(&gitignore, content.as_bytes())?;
        debug!("Added '{}' to {:?}", entry, gitignore);
        Ok(())
    }

    fn ignore_remove(&self, path: &Path) -> Result<()> {
        let (gitignore, entry) = Self::entry_for(path)?;
        let _guard = self.lock.lock();

        let lines = Self::read_lines(&gitignore)?;
        let kept: Vec<String> = lines.iter().filter(|line| line.trim() != entry).cloned().collect();
        if kept.len() == lines.len() {
            return Ok(());
        }

        if kept.iter().all(|line| line.trim().is_empty()) {
            utils::remove_path(&gitignore)?;
        } else {
            let mut content = kept.join("\n");
            content.push('\n');
            utils::atomic_write(&gitignore, content.as_bytes())?;
        }
        debug!("Removed '{}' from {:?}", entry, gitignore);
        Ok(())
    }

    fn is_tracked(&self, path: &Path) -> Result<bool> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["ls-files", "--error-unmatch", "--"])
            .arg(path)
            .output();

        match output {
            Ok(output) => Ok(output.status.success()),
            // No git binary: nothing can be tracked
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OutputError::Scm(format!("failed to run git: {}", e))),
        }
    }
}

//! Filesystem helpers shared by the local remote and the local cache
//!
//! ## Categories of Utilities
//!
//! - Content hashing (SHA-256, streamed for files)
//! - Atomic writes (temp file in the target directory, then rename)
//! - Removing and moving files or whole directory trees
//! - Byte formatting for log and CLI output

use crate::error::{OutputError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::trace;

/// Hash a file's content using SHA-256
///
/// Reads the file through an 8KB buffer so large artifacts are never held in
/// memory. Returns the hash as a 64-character hexadecimal string.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Modification time in nanoseconds since the epoch
pub fn mtime_ns(metadata: &fs::Metadata) -> Result<u64> {
    let modified = metadata.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default())
}

/// Atomic file write
///
/// The content goes to a temporary file created next to `path` and is then
/// renamed over it, so readers see either the old file or the complete new one.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| OutputError::Io(e.error))?;
    Ok(())
}

/// Remove a file, symlink or directory tree; missing paths are not an error
pub fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path)?;
            trace!("Removed directory {:?}", path);
        }
        Ok(_) => {
            fs::remove_file(path)?;
            trace!("Removed file {:?}", path);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Move a file or directory, creating the destination's parent
///
/// Moving a path onto itself does nothing. Falls back to copy + remove only
/// when the rename crosses filesystems.
///
/// # Errors
///
/// - [`OutputError::MoveIntoItself`] if `to` lies inside `from`
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if to.starts_with(from) {
        return Err(OutputError::MoveIntoItself {
            from: from.display().to_string(),
            to: to.display().to_string(),
        });
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            copy_path(from, to)?;
            remove_path(from)
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy a file or directory tree
pub fn copy_path(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        for entry in walkdir::WalkDir::new(from) {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| OutputError::internal(e.to_string()))?;
            let target = to.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
            }
        }
    } else {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
    }
    Ok(())
}

/// Relative, forward-slash form of `path` under `base`
pub fn relative_slash_path(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        OutputError::internal(format!("Path {:?} is not relative to {:?}", path, base))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Join a forward-slash relative path onto a base directory
pub fn join_slash_path(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

/// Format bytes in human-readable form (1024-based units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

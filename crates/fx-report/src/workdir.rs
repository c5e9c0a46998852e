//! Working directory shared by the browser downloads, the parser and the
//! report builder.
//!
//! The directory is emptied at the start of every run; downloads are later
//! matched by a marker substring in their file name.

use crate::error::FileSystemError;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

/// Suffixes browsers use for downloads that are still being written.
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

/// Create `dir` if needed and delete everything inside it.
///
/// Entries that cannot be removed are logged and skipped; the returned list
/// holds one error per failed entry. An error is only returned when the
/// directory itself cannot be created or listed.
pub fn prepare(dir: &Path) -> Result<Vec<FileSystemError>, FileSystemError> {
    std::fs::create_dir_all(dir).map_err(|source| FileSystemError::Create {
        path: dir.to_path_buf(),
        source,
    })?;

    let entries = std::fs::read_dir(dir).map_err(|source| FileSystemError::List {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut failures = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(t) if t.is_dir() => std::fs::remove_dir_all(&path),
            _ => std::fs::remove_file(&path),
        };
        match removed {
            Ok(()) => info!(path = %path.display(), "removed"),
            Err(source) => {
                let err = FileSystemError::Remove { path, source };
                warn!("{err}");
                failures.push(err);
            }
        }
    }
    Ok(failures)
}

/// Find the completed download whose file name contains `marker`.
///
/// When several files match, the most recently modified one wins.
pub fn locate_download(dir: &Path, marker: &str) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "cannot list download directory: {e}");
            return None;
        }
    };

    let mut matches: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.contains(marker) || is_partial(&name) {
                return None;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.path()))
        })
        .collect();

    if matches.len() > 1 {
        warn!(
            marker,
            count = matches.len(),
            "several downloads match, using the newest"
        );
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    matches.pop().map(|(_, path)| path)
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

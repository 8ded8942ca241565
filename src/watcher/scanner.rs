//! Startup scan of the watched directory tree.
//!
//! Node output lands in `<root>/<YYYYMMDD>/<HH>/<file>` buckets. The scan
//! registers every regular file found, at any depth, before the watcher
//! starts delivering events.

use std::path::{Path, PathBuf};

use super::error::WatcherError;
use super::table::{StartPosition, WatchedFileTable};

/// Register every regular file below `root` in `table`.
///
/// Files get offset 0 with [`StartPosition::Beginning`] and their current
/// size with [`StartPosition::End`]. Files or directories that vanish or
/// cannot be read mid-walk are skipped.
///
/// Returns the number of files registered.
///
/// # Errors
///
/// Returns an error if `root` is not a readable directory.
pub fn scan_directory(
    root: &Path,
    start: StartPosition,
    table: &mut WatchedFileTable,
) -> Result<usize, WatcherError> {
    if !root.is_dir() {
        return Err(WatcherError::NotADirectory(root.to_path_buf()));
    }

    let mut registered = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e.into()),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            // Symlinked directories are not followed.
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                pending.push(path);
                continue;
            }
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };

            if metadata.is_file() {
                let size = metadata.len();
                let offset = start.initial_offset(size);
                tracing::debug!(
                    path = %path.display(),
                    size,
                    offset,
                    "Registered existing file"
                );
                table.register(path, offset);
                registered += 1;
            }
        }
    }

    Ok(registered)
}

/// Find the most recent `<YYYYMMDD>/<HH>` bucket under `root`.
///
/// Returns `None` if no date directory with an hour directory exists.
#[must_use]
pub fn find_latest_hour_dir(root: &Path) -> Option<PathBuf> {
    let date = latest_numeric_dir(root, 8)?;
    latest_numeric_dir(&date, 2)
}

/// Find the most recently modified regular file in `dir`.
#[must_use]
pub fn find_latest_file(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let modified = metadata.modified().ok()?;
            Some((entry.path(), modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

/// Directory name made of exactly `width` ASCII digits, highest first.
fn latest_numeric_dir(parent: &Path, width: usize) -> Option<PathBuf> {
    std::fs::read_dir(parent)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.len() == width && name.bytes().all(|b| b.is_ascii_digit())
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .max()
}

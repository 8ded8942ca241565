//! Incremental file reader.
//!
//! Reads the bytes appended to a file since a stored offset.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::WatcherError;

/// Bytes read from one file in a single pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delta {
    /// Offset the read started at.
    pub start: u64,
    /// Offset just past the last byte read.
    pub end: u64,
    /// Raw bytes read.
    pub bytes: Vec<u8>,
    /// Whether the file had shrunk below the stored offset.
    pub truncated: bool,
}

/// Current length of `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be stat'ed (deleted, permission
/// denied).
pub async fn file_len(path: &Path) -> Result<u64, WatcherError> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| WatcherError::from_open(path, e))
}

/// Read everything between `offset` and the current end of `path`.
///
/// If the file is now shorter than `offset`, it was truncated or replaced;
/// reading restarts from byte 0 and the delta is flagged as truncated.
/// Anything written between the old offset and the truncation is lost.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be opened (file deleted, permission denied)
/// - I/O errors occur during reading
pub async fn read_delta(path: &Path, offset: u64) -> Result<Delta, WatcherError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| WatcherError::from_open(path, e))?;

    let file_len = file.metadata().await?.len();

    let mut start = offset;
    let truncated = file_len < offset;
    if truncated {
        tracing::warn!(
            path = %path.display(),
            old_offset = offset,
            new_len = file_len,
            "File truncated or rotated, resetting offset to 0"
        );
        start = 0;
    }

    if file_len == start {
        return Ok(Delta {
            start,
            end: start,
            bytes: Vec::new(),
            truncated,
        });
    }

    file.seek(std::io::SeekFrom::Start(start)).await?;

    let mut bytes = Vec::new();
    file.take(file_len - start).read_to_end(&mut bytes).await?;

    let end = start + bytes.len() as u64;
    tracing::trace!(
        path = %path.display(),
        start,
        end,
        "Read appended bytes"
    );

    Ok(Delta {
        start,
        end,
        bytes,
        truncated,
    })
}

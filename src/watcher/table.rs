//! Per-path tail state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::lines::LineReconstructor;
use crate::records::FragmentAssembler;

/// Where a newly registered file starts being read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Read the whole file from byte 0.
    Beginning,
    /// Skip existing content and tail from the current end of file.
    End,
}

impl StartPosition {
    /// Map a "read from start" flag to a start position.
    #[must_use]
    pub fn from_flag(read_from_start: bool) -> Self {
        if read_from_start {
            Self::Beginning
        } else {
            Self::End
        }
    }

    /// Initial offset for a file currently `size` bytes long.
    #[must_use]
    pub fn initial_offset(self, size: u64) -> u64 {
        match self {
            Self::Beginning => 0,
            Self::End => size,
        }
    }
}

/// Tail state for one file.
#[derive(Debug, Default)]
pub struct WatchedFile {
    /// Byte offset up to which the file has been consumed.
    pub offset: u64,
    /// Holds the trailing partial line between reads.
    pub lines: LineReconstructor,
    /// Unparsed multi-line JSON candidate.
    pub fragment: FragmentAssembler,
}

impl WatchedFile {
    /// Create state starting at `offset` with empty buffers.
    #[must_use]
    pub fn at(offset: u64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }
}

/// Table of every file the engine knows about, keyed by path.
#[derive(Debug, Default)]
pub struct WatchedFileTable {
    files: HashMap<PathBuf, WatchedFile>,
}

impl WatchedFileTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` at `offset`, replacing any previous state.
    pub fn register(&mut self, path: PathBuf, offset: u64) -> &mut WatchedFile {
        let slot = self.files.entry(path).or_default();
        *slot = WatchedFile::at(offset);
        slot
    }

    /// Whether `path` is tracked.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// State for `path`, if tracked.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&WatchedFile> {
        self.files.get(path)
    }

    /// Mutable state for `path`, if tracked.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut WatchedFile> {
        self.files.get_mut(path)
    }

    /// Stop tracking `path`, returning its state.
    pub fn remove(&mut self, path: &Path) -> Option<WatchedFile> {
        self.files.remove(path)
    }

    /// Move state from `from` to `to`.
    ///
    /// When `from` is a tracked file its state is carried over as is. When
    /// `from` is a directory, every tracked path below it is rebased onto
    /// `to`. Returns the number of entries moved.
    pub fn rename(&mut self, from: &Path, to: &Path) -> usize {
        if let Some(state) = self.files.remove(from) {
            self.files.insert(to.to_path_buf(), state);
            return 1;
        }

        let nested: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();

        for old in &nested {
            if let (Some(state), Ok(rel)) = (self.files.remove(old), old.strip_prefix(from)) {
                self.files.insert(to.join(rel), state);
            }
        }
        nested.len()
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over tracked paths.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

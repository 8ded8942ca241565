//! Recursive directory watcher with notify integration.
//!
//! Normalizes raw notify events into [`FsEvent`]s and forwards them, in the
//! order the OS reports them, to a tokio channel consumed by the engine.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatcherError;

/// Filesystem change relevant to the tail engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file appeared.
    Created(PathBuf),
    /// A file was written to.
    Modified(PathBuf),
    /// A file or directory was renamed from the first path to the second.
    MovedTo(PathBuf, PathBuf),
}

impl FsEvent {
    /// Path the event is about (the destination for renames).
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::MovedTo(_, p) => p,
        }
    }
}

/// Translate one notify event into engine events.
///
/// Rename pairs become [`FsEvent::MovedTo`]. The "from" half of a rename is
/// dropped; the "to" half is reported as a modification so a file moved in
/// from outside the tree is late-registered. Directory creations, removals
/// and access events produce nothing.
#[must_use]
pub fn translate(event: &notify::Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => files(&event.paths).map(FsEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to, ..] => vec![FsEvent::MovedTo(from.clone(), to.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(_) => files(&event.paths).map(FsEvent::Modified).collect(),
        _ => Vec::new(),
    }
}

fn files(paths: &[PathBuf]) -> impl Iterator<Item = PathBuf> + '_ {
    paths.iter().filter(|p| !p.is_dir()).cloned()
}

/// Watches a directory tree and emits [`FsEvent`]s.
///
/// Dropping the watcher ends the subscription; the receiver then yields
/// `None` once drained.
pub struct FileSystemWatcher {
    /// Root of the watched tree.
    root: PathBuf,
    /// Must stay alive, dropping it stops event delivery.
    _watcher: RecommendedWatcher,
}

impl FileSystemWatcher {
    /// Start watching `root` recursively.
    ///
    /// Returns the watcher and a receiver for translated events.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory or the OS watch cannot
    /// be registered.
    pub fn start(root: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<FsEvent>), WatcherError> {
        if !root.is_dir() {
            return Err(WatcherError::NotADirectory(root));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                match result {
                    Ok(event) => {
                        for fs_event in translate(&event) {
                            if event_tx.send(fs_event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Filesystem watcher error");
                    }
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "Watching directory tree");

        Ok((
            Self {
                root,
                _watcher: watcher,
            },
            event_rx,
        ))
    }

    /// Get the root being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

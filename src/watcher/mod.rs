//! Incremental tailing of a directory tree of append-only files.

mod error;
mod fs_watcher;
mod lines;
mod scanner;
mod table;
mod tailer;

pub use error::WatcherError;
pub use fs_watcher::{translate, FileSystemWatcher, FsEvent};
pub use lines::{CompleteLines, LineReconstructor};
pub use scanner::{find_latest_file, find_latest_hour_dir, scan_directory};
pub use table::{StartPosition, WatchedFile, WatchedFileTable};
pub use tailer::{file_len, read_delta, Delta};

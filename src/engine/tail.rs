//! Single-consumer tail engine.
//!
//! One [`TailEngine`] owns all tail state for one watched tree. It consumes
//! [`FsEvent`]s in order, reads what each file gained since the last read,
//! and pushes every extracted event through predicate, gate and dispatcher.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alert::{AlertDispatcher, AlertGate, AlertPredicate, Verdict};
use crate::records::{extract_events, Assembly, DomainEvent, FragmentLimits};
use crate::watcher::{
    file_len, find_latest_file, find_latest_hour_dir, read_delta, scan_directory, FsEvent,
    StartPosition, WatchedFileTable, WatcherError,
};

use super::stats::EngineStats;

/// Static settings for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name used in log output.
    pub name: String,
    /// Root of the watched tree.
    pub root: PathBuf,
    /// Read files found at startup from byte 0 instead of their end.
    pub read_existing_at_start: bool,
    /// Read files created while running from byte 0 instead of their end.
    pub read_new_files_from_start: bool,
    /// Bounds on multi-line JSON fragments.
    pub fragment_limits: FragmentLimits,
}

impl EngineOptions {
    /// Options tailing `root` from the end of every file.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            read_existing_at_start: false,
            read_new_files_from_start: true,
            fragment_limits: FragmentLimits::default(),
        }
    }
}

/// Tails one directory tree and raises alerts.
#[derive(Debug)]
pub struct TailEngine {
    options: EngineOptions,
    table: WatchedFileTable,
    predicate: AlertPredicate,
    gate: AlertGate,
    dispatcher: AlertDispatcher,
    stats: EngineStats,
}

impl TailEngine {
    /// Create an engine. Nothing is tracked until [`scan`](Self::scan) or
    /// the first event.
    #[must_use]
    pub fn new(
        options: EngineOptions,
        predicate: AlertPredicate,
        gate: AlertGate,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            options,
            table: WatchedFileTable::new(),
            predicate,
            gate,
            dispatcher,
            stats: EngineStats::default(),
        }
    }

    /// Engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.options.root
    }

    /// Tracked files.
    #[must_use]
    pub fn table(&self) -> &WatchedFileTable {
        &self.table
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            files_tracked: self.table.len(),
            ..self.stats.clone()
        }
    }

    /// Register every file already under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a readable directory.
    pub fn scan(&mut self) -> Result<usize, WatcherError> {
        let start = StartPosition::from_flag(self.options.read_existing_at_start);
        let registered = scan_directory(&self.options.root, start, &mut self.table)?;

        let latest = find_latest_hour_dir(&self.options.root);
        let latest_file = latest.as_deref().and_then(find_latest_file);
        tracing::info!(
            engine = %self.options.name,
            root = %self.options.root.display(),
            files = registered,
            start = ?start,
            latest_bucket = ?latest,
            latest_file = ?latest_file,
            "Initial scan complete"
        );
        Ok(registered)
    }

    /// Read every tracked file up to its current end.
    pub async fn catch_up(&mut self) {
        let mut paths: Vec<PathBuf> = self.table.paths().cloned().collect();
        paths.sort();
        for path in paths {
            self.process(&path).await;
        }
    }

    /// Apply one filesystem event.
    pub async fn handle(&mut self, event: FsEvent) {
        self.stats.fs_events += 1;
        match event {
            FsEvent::Created(path) => self.on_created(path).await,
            FsEvent::Modified(path) => self.on_modified(path).await,
            FsEvent::MovedTo(from, to) => self.on_moved(&from, to).await,
        }
    }

    async fn on_created(&mut self, path: PathBuf) {
        let start = StartPosition::from_flag(self.options.read_new_files_from_start);
        let size = match file_len(&path).await {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(
                    engine = %self.options.name,
                    path = %path.display(),
                    error = %e,
                    "Created file vanished before registration"
                );
                return;
            }
        };
        let offset = start.initial_offset(size);
        tracing::info!(
            engine = %self.options.name,
            path = %path.display(),
            size,
            offset,
            "New file"
        );
        self.table.register(path.clone(), offset);

        if start == StartPosition::Beginning {
            self.process(&path).await;
        }
    }

    async fn on_modified(&mut self, path: PathBuf) {
        if !self.table.contains(&path) {
            // Writes to a file never seen before: tail from here on.
            let size = match file_len(&path).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::debug!(
                        engine = %self.options.name,
                        path = %path.display(),
                        error = %e,
                        "Modified file vanished before registration"
                    );
                    return;
                }
            };
            tracing::info!(
                engine = %self.options.name,
                path = %path.display(),
                offset = size,
                "Late-registered file"
            );
            self.table.register(path.clone(), size);
        }
        self.process(&path).await;
    }

    async fn on_moved(&mut self, from: &Path, to: PathBuf) {
        let moved = self.table.rename(from, &to);
        if moved > 0 {
            tracing::info!(
                engine = %self.options.name,
                from = %from.display(),
                to = %to.display(),
                entries = moved,
                "Carried tail state across rename"
            );
            if self.table.contains(&to) {
                self.process(&to).await;
            }
            return;
        }

        if to.is_dir() {
            return;
        }
        if self.table.contains(&to) {
            self.process(&to).await;
        } else {
            self.on_created(to).await;
        }
    }

    /// Read what `path` gained since its stored offset and act on it.
    ///
    /// Untracked paths are ignored. Read failures are logged and leave the
    /// entry in place.
    pub async fn process(&mut self, path: &Path) {
        let Some(offset) = self.table.get(path).map(|f| f.offset) else {
            return;
        };

        let delta = match read_delta(path, offset).await {
            Ok(delta) => delta,
            Err(WatcherError::FileDeleted(_)) => {
                tracing::debug!(
                    engine = %self.options.name,
                    path = %path.display(),
                    "File disappeared before read"
                );
                self.stats.read_errors += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(
                    engine = %self.options.name,
                    path = %path.display(),
                    error = %e,
                    "Read failed"
                );
                self.stats.read_errors += 1;
                return;
            }
        };

        let Some(file) = self.table.get_mut(path) else {
            return;
        };

        if delta.truncated {
            file.lines.clear();
            file.fragment.clear();
            self.stats.truncations += 1;
        }
        file.offset = delta.end;
        self.stats.bytes_read += delta.bytes.len() as u64;
        tracing::trace!(
            engine = %self.options.name,
            path = %path.display(),
            start = delta.start,
            end = delta.end,
            "Read delta"
        );

        let mut values: Vec<Value> = Vec::new();
        for line in file.lines.push(Some(delta.bytes.as_slice())) {
            self.stats.lines += 1;
            match file.fragment.accept(&line, &self.options.fragment_limits) {
                Assembly::Complete(value) => values.push(value),
                Assembly::Discarded { .. } => self.stats.fragments_discarded += 1,
                Assembly::Incomplete | Assembly::Ignored => {}
            }
        }
        if file.fragment.pending_bytes() > 0 {
            tracing::trace!(
                engine = %self.options.name,
                path = %path.display(),
                pending_bytes = file.fragment.pending_bytes(),
                "Holding partial record"
            );
        }

        for value in values {
            self.stats.records += 1;
            let events = extract_events(value);
            if !events.is_empty() {
                tracing::debug!(
                    engine = %self.options.name,
                    path = %path.display(),
                    block = events[0].block_number().unwrap_or("?"),
                    events = events.len(),
                    "Extracted events"
                );
            }
            for event in events {
                self.stats.events += 1;
                self.evaluate(&event).await;
            }
        }
    }

    async fn evaluate(&mut self, event: &DomainEvent) {
        match self.predicate.evaluate(event) {
            Verdict::Quiet => {}
            Verdict::Filtered { category, symbol } => {
                self.stats.alerts_filtered += 1;
                tracing::debug!(
                    engine = %self.options.name,
                    category = %category,
                    symbol = symbol.as_deref().unwrap_or("?"),
                    "Symbol not in allow-list, alert dropped"
                );
            }
            Verdict::Fire(alert) => {
                if !self.gate.admit(&alert, Instant::now()) {
                    self.stats.alerts_suppressed += 1;
                    tracing::debug!(
                        engine = %self.options.name,
                        category = %alert.category,
                        key = %alert.key,
                        "Alert suppressed"
                    );
                    return;
                }

                if self.dispatcher.dispatch(&alert).await {
                    self.gate.record_delivery(&alert);
                    self.stats.alerts_sent += 1;
                } else {
                    self.stats.send_failures += 1;
                }
            }
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        cancel: CancellationToken,
    ) -> EngineStats {
        tracing::info!(engine = %self.options.name, "Engine running");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(engine = %self.options.name, "Engine cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        tracing::warn!(engine = %self.options.name, "Event channel closed");
                        break;
                    }
                },
            }
        }

        self.stats()
    }
}

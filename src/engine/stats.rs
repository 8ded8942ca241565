//! Engine counters.

/// Running totals for one engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Files currently tracked.
    pub files_tracked: usize,
    /// Filesystem events handled.
    pub fs_events: usize,
    /// Bytes read from watched files.
    pub bytes_read: u64,
    /// Complete lines seen.
    pub lines: usize,
    /// JSON values assembled.
    pub records: usize,
    /// Domain events extracted.
    pub events: usize,
    /// Alerts delivered.
    pub alerts_sent: usize,
    /// Alerts held back by the suppression gate.
    pub alerts_suppressed: usize,
    /// Alerts dropped by the symbol allow-list.
    pub alerts_filtered: usize,
    /// Alerts whose delivery failed.
    pub send_failures: usize,
    /// Reads that failed.
    pub read_errors: usize,
    /// Truncations or rotations detected.
    pub truncations: usize,
    /// Oversized multi-line fragments thrown away.
    pub fragments_discarded: usize,
}

impl EngineStats {
    /// Add another engine's totals into this one.
    pub fn merge(&mut self, other: &EngineStats) {
        self.files_tracked += other.files_tracked;
        self.fs_events += other.fs_events;
        self.bytes_read += other.bytes_read;
        self.lines += other.lines;
        self.records += other.records;
        self.events += other.events;
        self.alerts_sent += other.alerts_sent;
        self.alerts_suppressed += other.alerts_suppressed;
        self.alerts_filtered += other.alerts_filtered;
        self.send_failures += other.send_failures;
        self.read_errors += other.read_errors;
        self.truncations += other.truncations;
        self.fragments_discarded += other.fragments_discarded;
    }
}

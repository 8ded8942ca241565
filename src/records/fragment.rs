//! Reassembly of JSON values split across several lines.
//!
//! Writers occasionally flush a record in pieces or pretty-print it. A line
//! that looks like JSON but does not parse starts a fragment; following
//! lines are appended and the merged text is re-parsed until it forms a
//! value. Fragments are bounded so a persistently malformed file cannot grow
//! memory without limit.

use serde_json::Value;

/// Default cap on buffered fragment size.
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 1024 * 1024;

/// Default cap on lines merged into one fragment.
pub const DEFAULT_MAX_FRAGMENT_LINES: usize = 64;

/// Bounds on fragment accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentLimits {
    pub max_bytes: usize,
    pub max_lines: usize,
}

impl Default for FragmentLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
            max_lines: DEFAULT_MAX_FRAGMENT_LINES,
        }
    }
}

/// What became of one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    /// A complete JSON value is available.
    Complete(Value),
    /// The line was buffered as part of an unfinished value.
    Incomplete,
    /// Blank or non-JSON line.
    Ignored,
    /// The fragment exceeded its bounds and was thrown away.
    Discarded {
        /// Bytes dropped.
        bytes: usize,
        /// Lines dropped.
        lines: usize,
    },
}

/// Per-file multi-line JSON buffer.
#[derive(Debug, Default, Clone)]
pub struct FragmentAssembler {
    text: String,
    lines: usize,
}

fn looks_like_json(line: &str) -> bool {
    line.starts_with('{') || line.starts_with('[')
}

impl FragmentAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fragment is buffered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.text.is_empty()
    }

    /// Buffered fragment size in bytes.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.text.len()
    }

    /// Drop any buffered fragment.
    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    /// Feed one complete line.
    pub fn accept(&mut self, line: &str, limits: &FragmentLimits) -> Assembly {
        let line = line.trim();
        if line.is_empty() {
            return Assembly::Ignored;
        }

        if !self.is_pending() {
            if !looks_like_json(line) {
                tracing::debug!(line = %truncate(line, 80), "Skipping non-JSON line");
                return Assembly::Ignored;
            }
            return match serde_json::from_str(line) {
                Ok(value) => Assembly::Complete(value),
                Err(_) => {
                    self.text.push_str(line);
                    self.lines = 1;
                    self.enforce(limits)
                }
            };
        }

        let mut candidate = String::with_capacity(self.text.len() + 1 + line.len());
        candidate.push_str(&self.text);
        candidate.push('\n');
        candidate.push_str(line);

        if let Ok(value) = serde_json::from_str(&candidate) {
            self.clear();
            return Assembly::Complete(value);
        }

        if looks_like_json(line) {
            if let Ok(value) = serde_json::from_str(line) {
                tracing::warn!(
                    bytes = self.text.len(),
                    lines = self.lines,
                    "Dropping unfinished JSON fragment superseded by a complete line"
                );
                self.clear();
                return Assembly::Complete(value);
            }
        }

        self.text = candidate;
        self.lines += 1;
        self.enforce(limits)
    }

    fn enforce(&mut self, limits: &FragmentLimits) -> Assembly {
        if self.text.len() <= limits.max_bytes && self.lines <= limits.max_lines {
            tracing::trace!(
                bytes = self.text.len(),
                lines = self.lines,
                "Buffered unfinished JSON fragment"
            );
            return Assembly::Incomplete;
        }

        let dropped = Assembly::Discarded {
            bytes: self.text.len(),
            lines: self.lines,
        };
        tracing::warn!(
            bytes = self.text.len(),
            lines = self.lines,
            max_bytes = limits.max_bytes,
            max_lines = limits.max_lines,
            "Discarding oversized JSON fragment"
        );
        self.clear();
        dropped
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

//! Line reconstruction across partial reads.
//!
//! Bytes read from a growing file rarely end on a line boundary. The
//! reconstructor keeps the trailing fragment between reads and only hands
//! out lines whose terminator has been seen. `\n`, `\r\n` and a lone `\r`
//! all terminate a line; a `\r\n` pair split across two reads still counts
//! as one terminator.

/// Splits a byte stream into complete lines, carrying partial lines over.
#[derive(Debug, Default, Clone)]
pub struct LineReconstructor {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineReconstructor {
    /// Create an empty reconstructor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and take the lines it completes.
    ///
    /// `None` and empty chunks are no-ops. The returned iterator owns the
    /// completed bytes; any unterminated tail stays buffered for the next
    /// call.
    pub fn push(&mut self, chunk: Option<&[u8]>) -> CompleteLines {
        let Some(mut chunk) = chunk.filter(|c| !c.is_empty()) else {
            return CompleteLines::empty();
        };

        if std::mem::take(&mut self.after_cr) && chunk[0] == b'\n' {
            chunk = &chunk[1..];
        }

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let Some(last) = data.iter().rposition(|&b| is_terminator(b)) else {
            self.pending = data;
            return CompleteLines::empty();
        };

        self.pending = data.split_off(last + 1);
        self.after_cr = self.pending.is_empty() && data[last] == b'\r';

        CompleteLines { data, pos: 0 }
    }

    /// The buffered, unterminated fragment.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Whether a partial line is buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop any buffered fragment.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.after_cr = false;
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Lines completed by one [`LineReconstructor::push`] call.
///
/// Every byte sequence it covers ends with a terminator, so each item is a
/// full line without its terminator, decoded as lossy UTF-8.
#[derive(Debug)]
#[must_use]
pub struct CompleteLines {
    data: Vec<u8>,
    pos: usize,
}

impl CompleteLines {
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
        }
    }
}

impl Iterator for CompleteLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let end = rest.iter().position(|&b| is_terminator(b))?;
        let line = String::from_utf8_lossy(&rest[..end]).into_owned();

        let mut advance = end + 1;
        if rest[end] == b'\r' && rest.get(end + 1) == Some(&b'\n') {
            advance += 1;
        }
        self.pos += advance;
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(r: &mut LineReconstructor, chunk: &[u8]) -> Vec<String> {
        r.push(Some(chunk)).collect()
    }

    #[test]
    fn test_noop_on_empty_and_none() {
        let mut r = LineReconstructor::new();
        assert_eq!(r.push(None).count(), 0);
        assert_eq!(r.push(Some(b"")).count(), 0);
        assert!(!r.has_pending());
    }

    #[test]
    fn test_partial_line_is_buffered() {
        let mut r = LineReconstructor::new();
        assert!(collect(&mut r, b"{\"a\":1").is_empty());
        assert_eq!(r.pending(), b"{\"a\":1");

        assert_eq!(collect(&mut r, b"}\n{\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(r.pending(), b"{\"b\"");
    }

    #[test]
    fn test_many_lines_in_one_chunk() {
        let mut r = LineReconstructor::new();
        let lines = collect(&mut r, b"one\ntwo\r\nthree\rfour\n");
        assert_eq!(lines, vec!["one", "two", "three", "four"]);
        assert!(!r.has_pending());
    }

    #[test]
    fn test_terminated_chunk_clears_buffer() {
        let mut r = LineReconstructor::new();
        let _ = collect(&mut r, b"abc");
        assert_eq!(collect(&mut r, b"def\n"), vec!["abcdef"]);
        assert!(!r.has_pending());
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut r = LineReconstructor::new();
        assert_eq!(collect(&mut r, b"abc\r"), vec!["abc"]);
        assert_eq!(collect(&mut r, b"\ndef\n"), vec!["def"]);
    }

    #[test]
    fn test_empty_lines_are_yielded() {
        let mut r = LineReconstructor::new();
        assert_eq!(collect(&mut r, b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_chunking_does_not_change_lines() {
        let stream: &[u8] =
            b"{\"block_number\":1}\r\n{\"block_number\":2}\nnoise line\r{\"x\":\"\xce\xbb\"}\n";

        let mut whole = LineReconstructor::new();
        let expected: Vec<String> = whole.push(Some(stream)).collect();
        assert_eq!(expected.len(), 4);

        for size in 1..stream.len() {
            let mut r = LineReconstructor::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(size) {
                got.extend(r.push(Some(chunk)));
            }
            assert_eq!(got, expected, "chunk size {size}");
            assert!(!r.has_pending());
        }
    }

    #[test]
    fn test_clear_drops_fragment() {
        let mut r = LineReconstructor::new();
        let _ = collect(&mut r, b"abc\r");
        let _ = collect(&mut r, b"tail");
        r.clear();
        assert!(!r.has_pending());
        assert_eq!(collect(&mut r, b"\nx\n"), vec!["", "x"]);
    }
}

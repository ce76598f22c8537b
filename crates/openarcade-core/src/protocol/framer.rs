//! Line framer: cuts an unbounded byte stream into newline-terminated lines.
//!
//! A serial port hands the reader whatever bytes happen to be in the UART
//! buffer: half a JSON object, three objects at once, or a single newline.
//! [`LineFramer`] accumulates those chunks and yields only complete lines.
//!
//! Guarantees:
//!
//! - Lines are split on `\n` only.  The delimiter is not part of the yielded
//!   line; any other bytes (including `\r`) are passed through untouched.
//! - A trailing fragment with no `\n` stays buffered until a later chunk
//!   completes it.  Partial lines are never yielded.
//! - Feeding the same stream in any chunking produces the same lines.

/// Stateful accumulator turning byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Bytes before this offset have already been yielded as lines.
    consumed: usize,
    /// Bytes in `buf[consumed..scanned]` are known to contain no `\n`.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns a lazy iterator over the lines it completes.
    ///
    /// Lines left unread when the iterator is dropped are not lost; they are
    /// yielded by the iterator returned from the next `feed`.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.compact();
        self.buf.extend_from_slice(chunk);
        Lines { framer: self }
    }

    /// Number of buffered bytes not yet yielded as part of a line.
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.consumed
    }

    /// Discards the buffered partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.consumed = 0;
        self.scanned = 0;
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.scanned -= self.consumed;
            self.consumed = 0;
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let offset = self.buf[self.scanned..].iter().position(|&b| b == b'\n');
        match offset {
            Some(pos) => {
                let end = self.scanned + pos;
                let line = String::from_utf8_lossy(&self.buf[self.consumed..end]).into_owned();
                self.consumed = end + 1;
                self.scanned = self.consumed;
                Some(line)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }
}

/// Iterator over the complete lines available after a [`LineFramer::feed`].
///
/// Invalid UTF-8 is replaced with U+FFFD; such a line then fails JSON
/// decoding like any other malformed line.
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

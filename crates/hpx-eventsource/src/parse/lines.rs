//! Byte-to-line splitting for SSE streams.
//!
//! [`LineSplitter`] buffers the unterminated tail of the stream and hands out
//! one [`FieldLine`] per terminator. `LF`, `CR` and `CRLF` all end a line; the
//! `LF` half of a `CRLF` pair is absorbed even when it arrives in a later chunk
//! than the `CR`.

use bytes::{Buf, Bytes, BytesMut};

use super::constants::{BOM, COLON, CR, LF, SPACE};

/// A complete line from an SSE stream, without its terminator.
///
/// `field_len` is the byte offset of the first colon in the line, or the full
/// line length when the line has no colon. Two lines have a zero field length:
/// a blank line (event delimiter) and a comment (starts with `:`); they are
/// told apart by [`is_blank`](Self::is_blank) and
/// [`is_comment`](Self::is_comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLine {
    line: Bytes,
    field_len: usize,
}

impl FieldLine {
    /// Build a line from raw bytes, locating the field separator.
    pub fn new(line: impl Into<Bytes>) -> Self {
        let line = line.into();
        let field_len = memchr::memchr(COLON, &line).unwrap_or(line.len());
        Self { line, field_len }
    }

    pub(crate) fn from_parts(line: Bytes, field_len: usize) -> Self {
        debug_assert!(field_len <= line.len());
        Self { line, field_len }
    }

    /// The raw line bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.line
    }

    /// Length of the field name in bytes.
    pub fn field_len(&self) -> usize {
        self.field_len
    }

    /// Returns `true` for the empty line that terminates an event block.
    pub fn is_blank(&self) -> bool {
        self.line.is_empty()
    }

    /// Returns `true` for a comment line (starts with `:`).
    pub fn is_comment(&self) -> bool {
        !self.line.is_empty() && self.field_len == 0
    }

    /// The field name, i.e. everything before the first colon.
    pub fn field_name(&self) -> &[u8] {
        &self.line[..self.field_len]
    }

    /// The field value: everything after the colon, minus one optional
    /// leading space. Empty when the line has no colon.
    pub fn value(&self) -> Bytes {
        let start = self.field_len + 1;
        if start >= self.line.len() {
            return Bytes::new();
        }
        let start = if self.line[start] == SPACE {
            start + 1
        } else {
            start
        };
        self.line.slice(start..)
    }
}

/// Incremental line tokenizer.
///
/// One splitter serves one byte stream; construct a new one for each
/// connection attempt.
#[derive(Debug, Default)]
pub struct LineSplitter {
    /// Bytes of the line currently being assembled.
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no terminator.
    scanned: usize,
    /// First colon inside the scanned prefix, if any.
    colon: Option<usize>,
    /// The last line ended on a `CR` at the very end of the buffer.
    skip_lf: bool,
    /// BOM detection finished.
    started: bool,
}

impl LineSplitter {
    /// Create an empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and iterate over the lines it completes.
    ///
    /// The iterator is lazy: lines it does not yield stay buffered and are
    /// returned by the next call.
    pub fn process(&mut self, chunk: impl AsRef<[u8]>) -> Lines<'_> {
        self.push(chunk.as_ref());
        Lines { splitter: self }
    }

    /// Bytes received so far that do not yet form a complete line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.buffer.extend_from_slice(chunk);
        }
    }

    pub(crate) fn next_line(&mut self) -> Option<FieldLine> {
        if !self.started {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.buffer.advance(BOM.len());
                    self.started = true;
                }
                Some(false) => self.started = true,
                None => return None,
            }
        }

        if self.skip_lf && !self.buffer.is_empty() {
            self.skip_lf = false;
            if self.buffer[0] == LF {
                self.buffer.advance(1);
            }
        }

        let unscanned = &self.buffer[self.scanned..];
        let Some(offset) = memchr::memchr2(CR, LF, unscanned) else {
            if self.colon.is_none() {
                self.colon = memchr::memchr(COLON, unscanned).map(|pos| self.scanned + pos);
            }
            self.scanned = self.buffer.len();
            return None;
        };

        let eol = self.scanned + offset;
        let field_len = self
            .colon
            .or_else(|| {
                memchr::memchr(COLON, &self.buffer[self.scanned..eol]).map(|pos| self.scanned + pos)
            })
            .unwrap_or(eol);
        self.scanned = 0;
        self.colon = None;

        let line = self.buffer.split_to(eol).freeze();
        let terminator = self.buffer[0];
        self.buffer.advance(1);
        if terminator == CR {
            match self.buffer.first() {
                Some(&LF) => self.buffer.advance(1),
                Some(_) => {}
                None => self.skip_lf = true,
            }
        }

        Some(FieldLine::from_parts(line, field_len))
    }
}

/// Iterator over the lines completed by one [`LineSplitter::process`] call.
#[derive(Debug)]
pub struct Lines<'a> {
    splitter: &'a mut LineSplitter,
}

impl Iterator for Lines<'_> {
    type Item = FieldLine;

    fn next(&mut self) -> Option<Self::Item> {
        self.splitter.next_line()
    }
}

/// `None` while the buffer is a strict prefix of the BOM and more bytes are
/// needed to decide.
const fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    match buf.len() {
        0 => None,
        1 => {
            if buf[0] == BOM[0] {
                None
            } else {
                Some(false)
            }
        }
        2 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] {
                None
            } else {
                Some(false)
            }
        }
        _gte_3 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] && buf[2] == BOM[2] {
                Some(true)
            } else {
                Some(false)
            }
        }
    }
}

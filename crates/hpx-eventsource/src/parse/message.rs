//! Line-to-message accumulation.

use core::time::Duration;

use bytes::{Bytes, BytesMut};
use bytes_utils::{Str, StrMut};

use super::{
    constants::{EMPTY_STR, MESSAGE_STR},
    lines::FieldLine,
};

/// A completed SSE event block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The `id` set inside this block, empty if none.
    pub id: Str,
    /// The raw `event` field; empty means `"message"`.
    pub event: Str,
    /// All `data` lines joined with `\n`.
    pub data: Str,
    /// The `retry` value set inside this block, if any.
    pub retry: Option<Duration>,
}

impl Message {
    /// The type this message is dispatched under.
    pub fn event_type(&self) -> Str {
        if self.event.is_empty() {
            MESSAGE_STR
        } else {
            self.event.clone()
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: EMPTY_STR,
            event: EMPTY_STR,
            data: EMPTY_STR,
            retry: None,
        }
    }
}

/// Output of [`MessageAccumulator::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// An `id` line was read. Emitted immediately so the caller can track the
    /// last event id even if the block is never completed.
    Id(Str),
    /// A valid `retry` line was read. The value must be ASCII digits only;
    /// lines such as `retry: 1500ms` or `retry: 10.5` are ignored.
    Retry(Duration),
    /// A blank line completed the current block.
    Message(Message),
}

/// Recognised field names.
#[derive(Debug, Clone, Copy)]
enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// Data buffer that avoids copying in the common single-line case.
///
/// The first value is kept as an immutable [`Str`]; a mutable buffer is only
/// allocated once a second line has to be joined onto non-empty data.
#[derive(Debug, Default, Clone)]
enum DataBuffer {
    #[default]
    Uninit,
    Immutable(Str),
    Mutable(StrMut),
}

impl DataBuffer {
    fn freeze(self) -> Str {
        match self {
            Self::Uninit => EMPTY_STR,
            Self::Immutable(s) => s,
            Self::Mutable(s) => s.freeze(),
        }
    }

    fn push_str(&mut self, s: Str) {
        match self {
            Self::Uninit => *self = Self::Immutable(s),
            Self::Immutable(current) if current.is_empty() => *self = Self::Immutable(s),
            Self::Immutable(current) => {
                let inner = BytesMut::with_capacity(current.len() + 1 + s.len());
                // Safety: the buffer is empty, so it holds no invalid UTF-8.
                let mut buf = unsafe { StrMut::from_inner_unchecked(inner) };
                buf.push_str(current);
                buf.push('\n');
                buf.push_str(&s);
                *self = Self::Mutable(buf);
            }
            Self::Mutable(buf) => {
                buf.push('\n');
                buf.push_str(&s);
            }
        }
    }
}

/// Folds [`FieldLine`]s into [`FieldUpdate`]s.
///
/// The pending block is reset on every blank line and only there; in
/// particular the `id` does not carry over into the next block.
#[derive(Debug, Clone)]
pub struct MessageAccumulator {
    id: Str,
    event: Str,
    data: DataBuffer,
    retry: Option<Duration>,
}

impl Default for MessageAccumulator {
    fn default() -> Self {
        Self {
            id: EMPTY_STR,
            event: EMPTY_STR,
            data: DataBuffer::default(),
            retry: None,
        }
    }
}

impl MessageAccumulator {
    /// Create an accumulator with an empty pending block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one line. Returns at most one update.
    ///
    /// Malformed input (unknown fields, comments, non-numeric `retry`) is
    /// ignored, never reported.
    pub fn process(&mut self, line: &FieldLine) -> Option<FieldUpdate> {
        if line.is_blank() {
            return Some(FieldUpdate::Message(self.take()));
        }
        if line.field_len() == 0 {
            return None;
        }

        match FieldName::from_bytes(line.field_name()) {
            FieldName::Data => {
                self.data.push_str(decode(line.value()));
                None
            }
            FieldName::Event => {
                self.event = decode(line.value());
                None
            }
            FieldName::Id => {
                let id = decode(line.value());
                self.id = id.clone();
                Some(FieldUpdate::Id(id))
            }
            FieldName::Retry => {
                let retry = parse_retry(&line.value())?;
                self.retry = Some(retry);
                Some(FieldUpdate::Retry(retry))
            }
            FieldName::Ignored => None,
        }
    }

    fn take(&mut self) -> Message {
        let Self {
            id,
            event,
            data,
            retry,
        } = core::mem::take(self);

        Message {
            id,
            event,
            data: data.freeze(),
            retry,
        }
    }
}

/// Decode a field value, replacing invalid UTF-8 sequences with U+FFFD.
fn decode(value: Bytes) -> Str {
    let value = match core::str::from_utf8(&value) {
        Ok(_) => value,
        Err(_) => Bytes::from(String::from_utf8_lossy(&value).into_owned()),
    };
    // Safety: the bytes were either validated or produced from a `String`.
    unsafe { Str::from_inner_unchecked(value) }
}

/// `retry` values must consist of ASCII digits only.
fn parse_retry(value: &[u8]) -> Option<Duration> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return None;
    }
    core::str::from_utf8(value)
        .ok()?
        .parse()
        .ok()
        .map(Duration::from_millis)
}

//! Incremental Server-Sent Events parsing.
//!
//! Parsing is split into two pure, I/O-free stages that can be driven one
//! chunk (or one line) at a time:
//!
//! 1. [`LineSplitter`] turns raw byte chunks into [`FieldLine`]s, handling
//!    `LF`, `CR` and `CRLF` terminators across arbitrary chunk boundaries.
//! 2. [`MessageAccumulator`] folds those lines into [`FieldUpdate`]s: an
//!    immediate `id` or `retry` notification, or a completed [`Message`] when a
//!    blank line closes the event block.
//!
//! [`EventStream`] composes both stages over any byte [`Stream`](futures_core::Stream).
//!
//! The field rules follow the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation).

pub(crate) mod constants;
pub mod event_stream;
pub mod lines;
pub mod message;

pub use event_stream::EventStream;
pub use lines::{FieldLine, LineSplitter, Lines};
pub use message::{FieldUpdate, Message, MessageAccumulator};

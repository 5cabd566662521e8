//! [`Stream`] that converts a stream of
//! [`Bytes`](bytes::Bytes) chunks into [`FieldUpdate`]s.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures_core::Stream;

use super::{
    lines::LineSplitter,
    message::{FieldUpdate, MessageAccumulator},
};

pin_project_lite::pin_project! {
    /// A [`Stream`] that runs byte chunks through a [`LineSplitter`] and a
    /// [`MessageAccumulator`], in that order.
    ///
    /// Errors from the underlying stream are passed through unchanged; the
    /// SSE content itself never produces an error. Once the underlying stream
    /// ends, any unterminated line or unfinished block is discarded.
    #[project = EventStreamProjection]
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        lines: LineSplitter,
        messages: MessageAccumulator,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Create a new [`EventStream`] from an underlying byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            lines: LineSplitter::new(),
            messages: MessageAccumulator::new(),
            terminated: false,
        }
    }

    /// Bytes received that do not yet form a complete line.
    pub fn pending(&self) -> &[u8] {
        self.lines.pending()
    }
}

fn next_update(lines: &mut LineSplitter, messages: &mut MessageAccumulator) -> Option<FieldUpdate> {
    while let Some(line) = lines.next_line() {
        if let Some(update) = messages.process(&line) {
            return Some(update);
        }
    }
    None
}

impl<S, E, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<FieldUpdate, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(update) = next_update(this.lines, this.messages) {
                return Poll::Ready(Some(Ok(update)));
            }

            if *this.terminated {
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.lines.push(chunk.as_ref()),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => *this.terminated = true,
            }
        }
    }
}

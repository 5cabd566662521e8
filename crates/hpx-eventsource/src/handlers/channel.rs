//! Handler that turns callbacks into a [`Stream`].

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::{
    protocol::EventSourceHandler,
    types::{LifecycleEvent, MessageEvent},
};

/// A callback captured by a [`ChannelHandler`].
#[derive(Clone, Debug)]
pub enum HandlerEvent {
    /// `on_open` was called.
    Open(LifecycleEvent),
    /// `on_error` was called.
    Error(LifecycleEvent),
    /// `on_message` was called.
    Message(MessageEvent),
    /// `on_retry_delay_received` was called.
    RetryDelay(Duration),
}

/// [`EventSourceHandler`] that forwards every callback to a [`HandlerStream`].
///
/// The channel is unbounded so the driver never waits on a slow consumer.
/// Callbacks after the stream is dropped are discarded.
#[derive(Clone, Debug)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<HandlerEvent>,
}

impl ChannelHandler {
    /// Create a handler and the stream receiving its callbacks.
    #[must_use]
    pub fn new() -> (Self, HandlerStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, HandlerStream { rx })
    }

    fn send(&self, event: HandlerEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventSourceHandler for ChannelHandler {
    fn on_open(&self, event: &LifecycleEvent) {
        self.send(HandlerEvent::Open(event.clone()));
    }

    fn on_error(&self, event: &LifecycleEvent) {
        self.send(HandlerEvent::Error(event.clone()));
    }

    fn on_message(&self, event: &MessageEvent) {
        self.send(HandlerEvent::Message(event.clone()));
    }

    fn on_retry_delay_received(&self, delay: Duration) {
        self.send(HandlerEvent::RetryDelay(delay));
    }
}

/// Stream of [`HandlerEvent`]s from a [`ChannelHandler`].
///
/// Ends once every handler clone is dropped, which happens when the event
/// source's driver finishes.
#[derive(Debug)]
pub struct HandlerStream {
    rx: mpsc::UnboundedReceiver<HandlerEvent>,
}

impl HandlerStream {
    /// Receive the next callback, waiting until one is available.
    pub async fn next_event(&mut self) -> Option<HandlerEvent> {
        self.rx.recv().await
    }
}

impl Stream for HandlerStream {
    type Item = HandlerEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx.poll_recv(cx)
    }
}

//! Handler trait for event source lifecycle callbacks.
//!
//! Provides the [`EventSourceHandler`] trait, the single-slot counterpart of
//! the listener registry.

use std::time::Duration;

use crate::types::{LifecycleEvent, MessageEvent};

/// Callbacks invoked by the connection engine.
///
/// Each callback runs on the driver task right after the matching listeners,
/// so it should not block. All of them default to no-ops.
pub trait EventSourceHandler: Send + Sync + 'static {
    /// Called when a connection is established (or re-established).
    fn on_open(&self, _event: &LifecycleEvent) {}

    /// Called when a connection fails or is lost.
    fn on_error(&self, _event: &LifecycleEvent) {}

    /// Called for messages dispatched under the default `"message"` type.
    fn on_message(&self, _event: &MessageEvent) {}

    /// Called when the server changes the reconnection delay.
    fn on_retry_delay_received(&self, _delay: Duration) {}
}

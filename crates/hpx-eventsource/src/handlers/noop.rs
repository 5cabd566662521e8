use crate::protocol::EventSourceHandler;

/// Handler that ignores every callback. Used when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl EventSourceHandler for NoopHandler {}

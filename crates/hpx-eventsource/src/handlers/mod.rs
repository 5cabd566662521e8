//! Ready-to-use [`EventSourceHandler`](crate::EventSourceHandler)s.
//!
//! - [`NoopHandler`]: ignores every callback
//! - [`ChannelHandler`]: forwards callbacks into a [`HandlerStream`]

mod channel;
mod noop;

pub use channel::{ChannelHandler, HandlerEvent, HandlerStream};
pub use noop::NoopHandler;

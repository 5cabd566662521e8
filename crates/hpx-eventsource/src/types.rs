//! Core type definitions for event dispatch.

use std::{fmt, sync::Arc};

use bytes_utils::Str;

use crate::{config::CredentialsMode, error::EventSourceError};

/// Event type dispatched once a connection is established.
pub const OPEN_EVENT: &str = "open";
/// Event type dispatched on connection failures.
pub const ERROR_EVENT: &str = "error";
/// Event type of messages without an `event` field.
pub const MESSAGE_EVENT: &str = "message";

/// Media type an SSE response must declare.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Connection state of an [`EventSource`](crate::EventSource).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// A request is in flight, or a reconnect is pending.
    Connecting = 0,
    /// The response was validated and events are being received.
    Open = 1,
    /// Terminal: closed by the host or by a fatal failure.
    Closed = 2,
}

impl ReadyState {
    /// Returns `true` if events are being received.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the event source will never connect again.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// The request side of a connection attempt, as seen by listeners.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: http::Method,
    /// Request URL.
    pub url: String,
    /// Headers actually sent, including `Accept` and `Last-Event-ID`.
    pub headers: http::HeaderMap,
    /// Credentials mode of the request.
    pub credentials: CredentialsMode,
}

/// The response side of a connection attempt, as seen by listeners.
#[derive(Clone, Debug)]
pub struct ResponseInfo {
    /// Response status.
    pub status: http::StatusCode,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers.
    pub headers: http::HeaderMap,
}

/// Payload of `open` and `error` events.
///
/// `open` always carries both request and response. A fatal `error` carries
/// both as well; a non-fatal one has no response.
#[derive(Clone, Debug, Default)]
pub struct LifecycleEvent {
    /// The request of the attempt, if one was built.
    pub request: Option<RequestInfo>,
    /// The response, for `open` and fatal `error` events.
    pub response: Option<ResponseInfo>,
    /// Cause of an `error` event, if any. A clean end of stream has none.
    pub error: Option<Arc<EventSourceError>>,
}

/// A message dispatched to listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    event_type: Str,
    data: Str,
    last_event_id: Str,
    origin: Option<String>,
}

impl MessageEvent {
    pub(crate) fn new(
        event_type: Str,
        data: Str,
        last_event_id: Str,
        origin: Option<String>,
    ) -> Self {
        Self {
            event_type,
            data,
            last_event_id,
            origin,
        }
    }

    /// The type the message was dispatched under.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The message data.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The message's own id, or the last id seen before it.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Origin (`scheme://host[:port]`) of the final response URL.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// Anything an [`EventDispatcher`](crate::dispatch::EventDispatcher) delivers.
#[derive(Clone, Debug)]
pub enum SourceEvent {
    /// The connection was established.
    Open(LifecycleEvent),
    /// The connection failed or was lost.
    Error(LifecycleEvent),
    /// A message arrived.
    Message(MessageEvent),
}

impl SourceEvent {
    /// The type this event is dispatched under.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Open(_) => OPEN_EVENT,
            Self::Error(_) => ERROR_EVENT,
            Self::Message(message) => message.event_type(),
        }
    }

    /// The message payload, if this is a message.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The lifecycle payload, if this is an `open` or `error` event.
    pub fn as_lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            Self::Open(event) | Self::Error(event) => Some(event),
            Self::Message(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_round_trip() {
        for state in [ReadyState::Connecting, ReadyState::Open, ReadyState::Closed] {
            assert_eq!(ReadyState::from_u8(state as u8), state);
        }
        assert_eq!(ReadyState::Connecting as u8, 0);
        assert_eq!(ReadyState::Open as u8, 1);
        assert_eq!(ReadyState::Closed as u8, 2);
    }

    #[test]
    fn test_ready_state_predicates() {
        assert!(ReadyState::Open.is_open());
        assert!(!ReadyState::Connecting.is_open());
        assert!(ReadyState::Closed.is_closed());
        assert!(!ReadyState::Open.is_closed());
        assert_eq!(ReadyState::Connecting.to_string(), "CONNECTING");
    }

    #[test]
    fn test_source_event_types() {
        let open = SourceEvent::Open(LifecycleEvent::default());
        assert_eq!(open.event_type(), "open");
        assert!(open.as_lifecycle().is_some());
        assert!(open.as_message().is_none());

        assert_eq!(
            SourceEvent::Error(LifecycleEvent::default()).event_type(),
            "error"
        );

        let message = SourceEvent::Message(MessageEvent::new(
            Str::from_static("server-time"),
            Str::from_static("12:00"),
            Str::from_static("7"),
            Some("http://localhost:8080".to_string()),
        ));
        assert_eq!(message.event_type(), "server-time");
        let payload = message.as_message().expect("message payload");
        assert_eq!(payload.data(), "12:00");
        assert_eq!(payload.last_event_id(), "7");
        assert_eq!(payload.origin(), Some("http://localhost:8080"));
        assert!(message.as_lifecycle().is_none());
    }
}

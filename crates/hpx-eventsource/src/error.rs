//! Error handling for the event source.

use thiserror::Error;

/// The main result type used throughout the crate.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Boxed error produced by pluggable [`HttpClient`](crate::client::HttpClient)s.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by an [`EventSource`](crate::EventSource).
///
/// Malformed SSE content is never an error; only transport failures and
/// response validation failures are.
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// HTTP errors from the default reqwest-backed client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport or body read errors from any client.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The response status was not `200 OK`.
    #[error("Request failed with status code {status}")]
    InvalidStatus { status: http::StatusCode },

    /// The response was not `text/event-stream`.
    #[error(
        "Request failed with wrong content type '{}'",
        .content_type.as_deref().unwrap_or("none")
    )]
    InvalidContentType { content_type: Option<String> },

    /// The response had no body to stream.
    #[error("Request failed with empty response body")]
    EmptyBody,

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The request was cancelled by [`EventSource::close`](crate::EventSource::close).
    #[error("Request aborted")]
    Aborted,
}

impl From<BoxError> for EventSourceError {
    fn from(e: BoxError) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

impl EventSourceError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid status error.
    pub fn invalid_status(status: http::StatusCode) -> Self {
        Self::InvalidStatus { status }
    }

    /// Create an invalid content type error.
    pub fn invalid_content_type(content_type: Option<&str>) -> Self {
        Self::InvalidContentType {
            content_type: content_type.map(str::to_owned),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Returns `true` for response validation failures, which close the
    /// event source for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus { .. } | Self::InvalidContentType { .. } | Self::EmptyBody
        )
    }

    /// Returns `true` if the error only reflects a cancelled request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EventSourceError::config("Invalid URL");
        assert!(matches!(err, EventSourceError::Config { .. }));

        let err = EventSourceError::timeout(std::time::Duration::from_secs(5));
        assert!(matches!(err, EventSourceError::Timeout { .. }));

        let err = EventSourceError::from(BoxError::from("connection reset"));
        assert_eq!(err.to_string(), "Transport error: connection reset");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EventSourceError::invalid_status(http::StatusCode::UNAUTHORIZED).is_fatal());
        assert!(EventSourceError::invalid_content_type(Some("text/plain")).is_fatal());
        assert!(EventSourceError::EmptyBody.is_fatal());
        assert!(!EventSourceError::transport("reset").is_fatal());
        assert!(!EventSourceError::Aborted.is_fatal());
        assert!(EventSourceError::Aborted.is_aborted());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EventSourceError::invalid_status(http::StatusCode::UNAUTHORIZED).to_string(),
            "Request failed with status code 401 Unauthorized"
        );
        assert_eq!(
            EventSourceError::invalid_content_type(Some("text/plain")).to_string(),
            "Request failed with wrong content type 'text/plain'"
        );
    }
}

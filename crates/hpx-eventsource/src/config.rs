//! Event source configuration.

use std::{fmt, time::Duration};

use bytes::Bytes;

/// Default reconnection delay, until the server sends a `retry` field.
pub const DEFAULT_RETRY: Duration = Duration::from_millis(5000);

/// Credentials mode handed to the [`HttpClient`](crate::client::HttpClient),
/// mirroring the fetch `credentials` request option.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CredentialsMode {
    /// Never send credentials.
    Omit,
    /// Send credentials to same-origin URLs only.
    #[default]
    SameOrigin,
    /// Always send credentials.
    Include,
}

impl fmt::Display for CredentialsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Omit => write!(f, "omit"),
            Self::SameOrigin => write!(f, "same-origin"),
            Self::Include => write!(f, "include"),
        }
    }
}

/// Configuration for an [`EventSource`](crate::EventSource).
///
/// Provides sensible defaults and chainable setter methods.
#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    /// SSE endpoint URL.
    pub url: String,
    /// HTTP method (usually GET, some APIs use POST).
    pub method: http::Method,
    /// Additional HTTP headers to include with every request.
    pub headers: http::HeaderMap,
    /// Optional request body (for POST-based SSE).
    pub body: Option<Bytes>,
    /// Initial delay before reconnecting; replaced by server `retry` fields.
    pub retry: Duration,
    /// Never reconnect after a connection is lost.
    pub disable_retry: bool,
    /// Suppress all log output of this event source.
    pub disable_logging: bool,
    /// Subscriber that receives this event source's log output instead of
    /// the default one.
    pub logger: Option<tracing::Dispatch>,
    /// Send credentials with cross-origin requests.
    pub with_credentials: bool,
    /// Never send credentials; takes precedence over `with_credentials`.
    pub omit_credentials: bool,
    /// Maximum time to wait for the response headers.
    pub connect_timeout: Option<Duration>,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: http::Method::GET,
            headers: http::HeaderMap::new(),
            body: None,
            retry: DEFAULT_RETRY,
            disable_retry: false,
            disable_logging: false,
            logger: None,
            with_credentials: false,
            omit_credentials: false,
            connect_timeout: None,
        }
    }
}

impl EventSourceConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the HTTP method (e.g., `POST` for POST-based SSE).
    #[must_use]
    pub fn method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body (for POST-based SSE).
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn retry(mut self, delay: Duration) -> Self {
        self.retry = delay;
        self
    }

    /// Disable reconnection.
    #[must_use]
    pub fn disable_retry(mut self, disable: bool) -> Self {
        self.disable_retry = disable;
        self
    }

    /// Disable logging.
    #[must_use]
    pub fn disable_logging(mut self, disable: bool) -> Self {
        self.disable_logging = disable;
        self
    }

    /// Route log output to the given subscriber.
    #[must_use]
    pub fn logger(mut self, logger: impl Into<tracing::Dispatch>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// Send credentials with cross-origin requests.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Never send credentials.
    #[must_use]
    pub fn omit_credentials(mut self, omit_credentials: bool) -> Self {
        self.omit_credentials = omit_credentials;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// The credentials mode resulting from `omit_credentials` and
    /// `with_credentials`. `omit_credentials` wins when both are set.
    pub fn credentials_mode(&self) -> CredentialsMode {
        if self.omit_credentials {
            CredentialsMode::Omit
        } else if self.with_credentials {
            CredentialsMode::Include
        } else {
            CredentialsMode::SameOrigin
        }
    }

    /// Returns `true` when both credential flags are set and
    /// `with_credentials` is ignored.
    pub fn has_conflicting_credentials(&self) -> bool {
        self.omit_credentials && self.with_credentials
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if let Err(e) = url::Url::parse(&self.url) {
            return Err(format!("Invalid URL '{}': {e}", self.url));
        }
        if self.connect_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("Connect timeout must be > 0".to_string());
        }
        Ok(())
    }
}

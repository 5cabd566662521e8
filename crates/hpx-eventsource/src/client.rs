//! Pluggable HTTP client used to open event streams.
//!
//! [`HttpClient`] is the seam between the connection engine and the network.
//! [`ReqwestClient`] is the default implementation; tests and hosts with their
//! own stack can supply any other.

use std::{fmt, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    config::CredentialsMode,
    error::{BoxError, EventSourceError, EventSourceResult},
    types::{RequestInfo, ResponseInfo},
};

/// Response body as a stream of byte chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Cache directive of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Let the client decide.
    #[default]
    Default,
    /// Bypass every cache.
    NoStore,
}

/// A request issued by the connection engine.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: http::Method,
    /// Headers to send.
    pub headers: http::HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
    /// Cache directive.
    pub cache: CacheMode,
    /// Credentials mode.
    pub credentials: CredentialsMode,
    /// Cancelled when the attempt is aborted. Must end the body stream.
    pub cancellation: CancellationToken,
}

impl HttpRequest {
    /// Listener-facing view of this request.
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            credentials: self.credentials,
        }
    }
}

/// A response returned by an [`HttpClient`].
pub struct HttpResponse {
    /// Response status.
    pub status: http::StatusCode,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Final URL after redirects.
    pub url: String,
    /// Body stream, `None` if the response has no body.
    pub body: Option<BodyStream>,
}

impl HttpResponse {
    /// The `Content-Type` header, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Listener-facing view of this response.
    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            status: self.status,
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Executes event stream requests.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send `request` and resolve once the response headers are available.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Aborted`] if the request token is
    /// cancelled first, or a transport error if the request fails.
    async fn execute(&self, request: HttpRequest) -> EventSourceResult<HttpResponse>;
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> EventSourceResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EventSourceError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing [`reqwest::Client`].
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Headers that carry credentials and are stripped in [`CredentialsMode::Omit`].
const CREDENTIAL_HEADERS: [http::header::HeaderName; 2] =
    [http::header::AUTHORIZATION, http::header::COOKIE];

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> EventSourceResult<HttpResponse> {
        let HttpRequest {
            url,
            method,
            mut headers,
            body,
            cache,
            credentials,
            cancellation,
        } = request;

        if cache == CacheMode::NoStore && !headers.contains_key(http::header::CACHE_CONTROL) {
            headers.insert(
                http::header::CACHE_CONTROL,
                http::HeaderValue::from_static("no-store"),
            );
        }
        if credentials == CredentialsMode::Omit {
            for name in CREDENTIAL_HEADERS {
                headers.remove(name);
            }
        }

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = tokio::select! {
            biased;

            () = cancellation.cancelled() => return Err(EventSourceError::Aborted),
            response = builder.send() => response?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = if response.content_length() == Some(0) {
            None
        } else {
            Some(
                response
                    .bytes_stream()
                    .map_err(BoxError::from)
                    .take_until(cancellation.cancelled_owned())
                    .boxed(),
            )
        };

        Ok(HttpResponse {
            status,
            headers,
            url,
            body,
        })
    }
}

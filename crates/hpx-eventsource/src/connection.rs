//! Event source connection driver.
//!
//! Provides [`EventSource`] and [`EventSourceBuilder`]. A background task
//! connects, parses the stream, dispatches events to listeners and the
//! [`EventSourceHandler`], and reconnects after the server-adjustable retry
//! delay, resuming from the last event id.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes_utils::Str;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, debug, error, info, instrument::WithSubscriber, warn};

use crate::{
    client::{BodyStream, CacheMode, HttpClient, HttpRequest, HttpResponse, ReqwestClient},
    config::EventSourceConfig,
    dispatch::{EventDispatcher, Listener, ListenerRegistry},
    error::{EventSourceError, EventSourceResult},
    handlers::NoopHandler,
    parse::{EventStream, FieldUpdate, Message, constants::EMPTY_STR},
    protocol::EventSourceHandler,
    types::{
        ERROR_EVENT, EVENT_STREAM_MIME, LifecycleEvent, MESSAGE_EVENT, MessageEvent, OPEN_EVENT,
        ReadyState, RequestInfo, ResponseInfo, SourceEvent,
    },
};

const LAST_EVENT_ID: http::HeaderName = http::HeaderName::from_static("last-event-id");

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between an [`EventSource`] and its driver task.
#[derive(Debug)]
struct Shared {
    url: String,
    with_credentials: bool,
    state: AtomicU8,
    retry_ms: AtomicU64,
    last_event_id: Mutex<Str>,
    /// Cancelled by `close()`; every connection attempt uses a child token.
    closed: CancellationToken,
    /// Cancelled when the driver task returns.
    finished: CancellationToken,
}

impl Shared {
    fn new(config: &EventSourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            with_credentials: config.with_credentials,
            state: AtomicU8::new(ReadyState::Connecting as u8),
            retry_ms: AtomicU64::new(duration_to_millis(config.retry)),
            last_event_id: Mutex::new(EMPTY_STR),
            closed: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `state` unless already closed. Returns `false` if closed.
    fn transition(&self, state: ReadyState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ReadyState::Closed as u8).then_some(state as u8)
            })
            .is_ok()
    }

    /// Close and cancel any pending work. Returns `false` if already closed.
    fn close(&self) -> bool {
        let previous = self
            .state
            .swap(ReadyState::Closed as u8, Ordering::AcqRel);
        self.closed.cancel();
        previous != ReadyState::Closed as u8
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_ms.load(Ordering::Acquire))
    }

    fn set_retry_delay(&self, delay: Duration) {
        self.retry_ms
            .store(duration_to_millis(delay), Ordering::Release);
    }

    fn last_event_id(&self) -> Str {
        self.last_event_id.lock().clone()
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Public API: EventSourceBuilder
// ---------------------------------------------------------------------------

/// Configures collaborators before connecting an [`EventSource`].
///
/// Listeners added here are registered before the driver starts, so they
/// cannot miss the first `open` event.
pub struct EventSourceBuilder {
    config: EventSourceConfig,
    handler: Arc<dyn EventSourceHandler>,
    http_client: Option<Arc<dyn HttpClient>>,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    listeners: Vec<(String, Listener)>,
}

impl EventSourceBuilder {
    /// Start from `config` with the default collaborators.
    #[must_use]
    pub fn new(config: EventSourceConfig) -> Self {
        Self {
            config,
            handler: Arc::new(NoopHandler),
            http_client: None,
            dispatcher: None,
            listeners: Vec::new(),
        }
    }

    /// Set the lifecycle callback handler.
    #[must_use]
    pub fn handler<H: EventSourceHandler>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Replace the default [`ReqwestClient`].
    #[must_use]
    pub fn http_client<C: HttpClient>(mut self, client: C) -> Self {
        self.http_client = Some(Arc::new(client));
        self
    }

    /// Replace the default [`ListenerRegistry`].
    #[must_use]
    pub fn dispatcher<D: EventDispatcher>(mut self, dispatcher: Arc<D>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Register a listener for `event_type` before connecting.
    #[must_use]
    pub fn listener<F>(mut self, event_type: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&SourceEvent) + Send + Sync + 'static,
    {
        self.listeners.push((event_type.into(), Arc::new(listener)));
        self
    }

    /// Validate the configuration and start connecting.
    ///
    /// Spawns the background driver task, so it must be called from within a
    /// tokio runtime. Connection failures are reported through `error`
    /// events, not through this result.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or the default HTTP
    /// client cannot be built.
    pub async fn connect(self) -> EventSourceResult<EventSource> {
        let Self {
            config,
            handler,
            http_client,
            dispatcher,
            listeners,
        } = self;

        config.validate().map_err(EventSourceError::config)?;

        let http_client: Arc<dyn HttpClient> = match http_client {
            Some(client) => client,
            None => Arc::new(ReqwestClient::new()?),
        };
        let dispatcher: Arc<dyn EventDispatcher> = match dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(ListenerRegistry::new()),
        };
        for (event_type, listener) in listeners {
            dispatcher.add_listener(&event_type, listener);
        }

        let subscriber = if config.disable_logging {
            Some(Dispatch::none())
        } else {
            config.logger.clone()
        };

        let shared = Arc::new(Shared::new(&config));
        let driver = Driver {
            config,
            shared: Arc::clone(&shared),
            handler,
            http_client,
            dispatcher: Arc::clone(&dispatcher),
        };

        match &subscriber {
            Some(dispatch) => tokio::spawn(driver.run().with_subscriber(dispatch.clone())),
            None => tokio::spawn(driver.run()),
        };

        Ok(EventSource {
            shared,
            dispatcher,
            subscriber,
        })
    }
}

impl fmt::Debug for EventSourceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceBuilder")
            .field("config", &self.config)
            .field("custom_http_client", &self.http_client.is_some())
            .field("custom_dispatcher", &self.dispatcher.is_some())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Public API: EventSource
// ---------------------------------------------------------------------------

/// A Server-Sent Events connection.
///
/// Dropping the event source closes it.
pub struct EventSource {
    shared: Arc<Shared>,
    dispatcher: Arc<dyn EventDispatcher>,
    subscriber: Option<Dispatch>,
}

impl EventSource {
    /// Start configuring an event source.
    #[must_use]
    pub fn builder(config: EventSourceConfig) -> EventSourceBuilder {
        EventSourceBuilder::new(config)
    }

    /// Connect with the default collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub async fn connect(config: EventSourceConfig) -> EventSourceResult<Self> {
        EventSourceBuilder::new(config).connect().await
    }

    /// The configured URL.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// The current connection state.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    /// The current reconnection delay.
    pub fn retry_delay(&self) -> Duration {
        self.shared.retry_delay()
    }

    /// Whether credentials are sent with cross-origin requests.
    pub fn with_credentials(&self) -> bool {
        self.shared.with_credentials
    }

    /// The last event id seen, empty if none.
    pub fn last_event_id(&self) -> String {
        self.shared.last_event_id().to_string()
    }

    /// Register a listener for `event_type`. The returned handle can be passed
    /// to [`remove_event_listener`](Self::remove_event_listener).
    pub fn add_event_listener<F>(&self, event_type: &str, listener: F) -> Listener
    where
        F: Fn(&SourceEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.dispatcher
            .add_listener(event_type, Arc::clone(&listener));
        listener
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn remove_event_listener(&self, event_type: &str, listener: &Listener) -> bool {
        self.dispatcher.remove_listener(event_type, listener)
    }

    /// The dispatcher listeners are registered with.
    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub fn close(&self) {
        if !self.shared.close() {
            return;
        }
        let log = || info!(url = %self.shared.url, "Event source closed");
        match &self.subscriber {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, log),
            None => log(),
        }
    }

    /// Wait until the driver task has stopped, after [`close`](Self::close)
    /// or a fatal failure.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await;
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.shared.url)
            .field("ready_state", &self.ready_state())
            .field("retry_delay", &self.retry_delay())
            .field("last_event_id", &self.shared.last_event_id())
            .finish_non_exhaustive()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Reconnect,
    Stop,
}

/// The long-lived background task that drives the connection.
struct Driver {
    config: EventSourceConfig,
    shared: Arc<Shared>,
    handler: Arc<dyn EventSourceHandler>,
    http_client: Arc<dyn HttpClient>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl Driver {
    async fn run(self) {
        let _finished = self.shared.finished.clone().drop_guard();

        if self.config.has_conflicting_credentials() {
            warn!(
                url = %self.shared.url,
                "Both omit_credentials and with_credentials are set; credentials are omitted"
            );
        }

        while self.connect().await == Next::Reconnect {}

        debug!(url = %self.shared.url, "Event source driver stopped");
    }

    /// One connection attempt, through to the end of its stream.
    async fn connect(&self) -> Next {
        let token = self.shared.closed.child_token();
        if !self.shared.transition(ReadyState::Connecting) {
            warn!(url = %self.shared.url, "Event source is closed, not connecting");
            return Next::Stop;
        }

        let request = self.build_request(token.clone());
        let request_info = request.info();
        info!(url = %request_info.url, method = %request_info.method, "Event source connecting");

        let response = match self.send(request, &token).await {
            Ok(response) => response,
            Err(_) if token.is_cancelled() => {
                debug!(url = %self.shared.url, "Event source request aborted");
                return Next::Stop;
            }
            Err(err) => return self.reconnect(request_info, Some(err)).await,
        };

        let response_info = response.info();
        let body = match validate(response) {
            Ok(body) => body,
            Err(err) => {
                self.fail_connection(request_info, response_info, err);
                return Next::Stop;
            }
        };

        let origin = origin_of(&response_info.url);
        self.announce_connection(request_info.clone(), response_info);

        let mut events = EventStream::new(body);
        let error = loop {
            let item = tokio::select! {
                biased;

                () = token.cancelled() => {
                    debug!(url = %self.shared.url, "Event source stream aborted");
                    return Next::Stop;
                }
                item = events.next() => item,
            };

            match item {
                Some(Ok(update)) => self.handle_update(update, origin.as_deref()),
                Some(Err(err)) => break Some(EventSourceError::from(err)),
                None => break None,
            }
        };

        if token.is_cancelled() {
            return Next::Stop;
        }
        self.reconnect(request_info, error).await
    }

    fn build_request(&self, cancellation: CancellationToken) -> HttpRequest {
        let mut headers = self.config.headers.clone();
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static(EVENT_STREAM_MIME),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-store"),
        );

        let last_event_id = self.shared.last_event_id();
        if !last_event_id.is_empty() {
            match http::HeaderValue::from_str(&last_event_id) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => warn!(
                    last_event_id = %last_event_id,
                    "Last event id is not a valid header value, not sending it"
                ),
            }
        }

        HttpRequest {
            url: self.config.url.clone(),
            method: self.config.method.clone(),
            headers,
            body: self.config.body.clone(),
            cache: CacheMode::NoStore,
            credentials: self.config.credentials_mode(),
            cancellation,
        }
    }

    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> EventSourceResult<HttpResponse> {
        let execute = async move {
            match self.config.connect_timeout {
                Some(duration) => timeout(duration, self.http_client.execute(request))
                    .await
                    .unwrap_or_else(|_| Err(EventSourceError::timeout(duration))),
                None => self.http_client.execute(request).await,
            }
        };

        tokio::select! {
            biased;

            () = token.cancelled() => Err(EventSourceError::Aborted),
            result = execute => result,
        }
    }

    /// Fatal failure: close for good and report it once.
    fn fail_connection(
        &self,
        request: RequestInfo,
        response: ResponseInfo,
        err: EventSourceError,
    ) {
        error!(
            url = %self.shared.url,
            status = %response.status,
            error = %err,
            "Event source connection failed"
        );
        self.shared.close();

        let event = LifecycleEvent {
            request: Some(request),
            response: Some(response),
            error: Some(Arc::new(err)),
        };
        self.dispatcher
            .dispatch(ERROR_EVENT, &SourceEvent::Error(event.clone()));
        self.handler.on_error(&event);
    }

    fn announce_connection(&self, request: RequestInfo, response: ResponseInfo) {
        if !self.shared.transition(ReadyState::Open) {
            return;
        }
        info!(url = %self.shared.url, status = %response.status, "Event source connection established");

        let event = LifecycleEvent {
            request: Some(request),
            response: Some(response),
            error: None,
        };
        self.dispatcher
            .dispatch(OPEN_EVENT, &SourceEvent::Open(event.clone()));
        self.handler.on_open(&event);
    }

    fn handle_update(&self, update: FieldUpdate, origin: Option<&str>) {
        match update {
            FieldUpdate::Id(id) => {
                *self.shared.last_event_id.lock() = id;
            }
            FieldUpdate::Retry(delay) => {
                debug!(delay_ms = duration_to_millis(delay), "Event source retry delay updated");
                self.shared.set_retry_delay(delay);
                self.handler.on_retry_delay_received(delay);
            }
            FieldUpdate::Message(message) => self.dispatch_message(message, origin),
        }
    }

    fn dispatch_message(&self, message: Message, origin: Option<&str>) {
        let event_type = message.event_type();
        let last_event_id = if message.id.is_empty() {
            self.shared.last_event_id()
        } else {
            message.id
        };
        let event = MessageEvent::new(
            event_type.clone(),
            message.data,
            last_event_id,
            origin.map(str::to_owned),
        );
        debug!(
            event_type = %event_type,
            id = %event.last_event_id(),
            "Event source message received"
        );

        self.dispatcher
            .dispatch(&event_type, &SourceEvent::Message(event.clone()));
        if &*event_type == MESSAGE_EVENT {
            self.handler.on_message(&event);
        }
    }

    /// Non-fatal failure or end of stream: report it, then wait out the retry
    /// delay unless closed or retries are disabled.
    async fn reconnect(&self, request: RequestInfo, err: Option<EventSourceError>) -> Next {
        self.shared.transition(ReadyState::Connecting);

        match &err {
            Some(err) => warn!(url = %self.shared.url, error = %err, "Event source connection lost"),
            None => info!(url = %self.shared.url, "Event source stream ended"),
        }

        let event = LifecycleEvent {
            request: Some(request),
            response: None,
            error: err.map(Arc::new),
        };
        self.dispatcher
            .dispatch(ERROR_EVENT, &SourceEvent::Error(event.clone()));
        self.handler.on_error(&event);

        if self.shared.ready_state().is_closed() {
            return Next::Stop;
        }
        if self.config.disable_retry {
            info!(url = %self.shared.url, "Event source retry disabled, closing");
            self.shared.close();
            return Next::Stop;
        }

        let delay = self.shared.retry_delay();
        info!(
            url = %self.shared.url,
            delay_ms = duration_to_millis(delay),
            "Event source reconnecting after retry delay"
        );

        tokio::select! {
            biased;

            () = self.shared.closed.cancelled() => Next::Stop,
            () = tokio::time::sleep(delay) => Next::Reconnect,
        }
    }
}

/// Check that a response can be streamed.
fn validate(response: HttpResponse) -> EventSourceResult<BodyStream> {
    if response.status != http::StatusCode::OK {
        return Err(EventSourceError::invalid_status(response.status));
    }
    let content_type = response.content_type();
    if !content_type.is_some_and(|ct| ct.contains(EVENT_STREAM_MIME)) {
        return Err(EventSourceError::invalid_content_type(content_type));
    }
    response.body.ok_or(EventSourceError::EmptyBody)
}

/// `scheme://host[:port]` of `url`, if it has a tuple origin.
fn origin_of(url: &str) -> Option<String> {
    let origin = url::Url::parse(url).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn response(status: u16, content_type: Option<&'static str>, body: bool) -> HttpResponse {
        let mut headers = http::HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static(ct),
            );
        }
        HttpResponse {
            status: http::StatusCode::from_u16(status).expect("valid status"),
            headers,
            url: "http://localhost:8080/sse".to_string(),
            body: body.then(|| {
                futures_util::stream::iter(vec![Ok(Bytes::from_static(b"data: x\n\n"))]).boxed()
            }),
        }
    }

    #[test]
    fn test_validate_accepts_event_stream() {
        assert!(validate(response(200, Some("text/event-stream"), true)).is_ok());
        assert!(validate(response(200, Some("text/event-stream; charset=utf-8"), true)).is_ok());
    }

    #[test]
    fn test_validate_rejects_status() {
        for status in [201, 204, 301, 401, 500] {
            let err = validate(response(status, Some("text/event-stream"), true))
                .err()
                .expect("should fail");
            assert!(matches!(err, EventSourceError::InvalidStatus { .. }), "{status}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_validate_rejects_content_type() {
        let err = validate(response(200, Some("text/plain"), true))
            .err()
            .expect("should fail");
        assert!(matches!(
            err,
            EventSourceError::InvalidContentType { content_type: Some(ref ct) } if ct == "text/plain"
        ));

        let err = validate(response(200, None, true)).err().expect("should fail");
        assert!(matches!(
            err,
            EventSourceError::InvalidContentType { content_type: None }
        ));
    }

    #[test]
    fn test_validate_rejects_missing_body() {
        let err = validate(response(200, Some("text/event-stream"), false))
            .err()
            .expect("should fail");
        assert!(matches!(err, EventSourceError::EmptyBody));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("http://localhost:8080/sse?x=1").as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(
            origin_of("https://example.com:443/events").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(origin_of("data:text/plain,hello"), None);
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn test_shared_state_transitions() {
        let shared = Shared::new(&EventSourceConfig::new("http://localhost/sse"));
        assert_eq!(shared.ready_state(), ReadyState::Connecting);
        assert!(shared.transition(ReadyState::Open));
        assert_eq!(shared.ready_state(), ReadyState::Open);

        assert!(shared.close());
        assert!(!shared.close());
        assert!(shared.closed.is_cancelled());
        assert!(!shared.transition(ReadyState::Connecting));
        assert_eq!(shared.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_shared_retry_delay() {
        let shared = Shared::new(
            &EventSourceConfig::new("http://localhost/sse").retry(Duration::from_millis(250)),
        );
        assert_eq!(shared.retry_delay(), Duration::from_millis(250));
        shared.set_retry_delay(Duration::from_millis(55555));
        assert_eq!(shared.retry_delay(), Duration::from_millis(55555));
    }
}

//! End-to-end tests against a real HTTP server.
//!
//! Uses a mock hyper HTTP/1 server to emit SSE responses, verifying the full
//! reqwest → parse → dispatch pipeline.

use std::{collections::VecDeque, convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use hpx_eventsource::{EventSource, EventSourceConfig, EventSourceError, ReadyState, SourceEvent};
use http_body_util::Full;
use hyper::{
    Request, Response,
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::mpsc, time::timeout};

// ---------------------------------------------------------------------------
// Mock SSE server helpers
// ---------------------------------------------------------------------------

type Script = Vec<(&'static str, &'static str, u16)>;

/// Headers of every request the server received, in order.
type Recorded = Arc<Mutex<Vec<http::HeaderMap>>>;

/// Start a mock server answering each request with the next scripted
/// `(body, content type, status)`. Once the script is exhausted it answers
/// `503`.
async fn start_sse_server(script: Script) -> (SocketAddr, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let responses = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));
    let recorded: Recorded = Arc::default();

    let requests = Arc::clone(&recorded);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let responses = Arc::clone(&responses);
            let requests = Arc::clone(&requests);
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req: Request<Incoming>| {
                            requests.lock().push(req.headers().clone());
                            let (body, content_type, status) = responses
                                .lock()
                                .pop_front()
                                .unwrap_or(("", "text/plain", 503));
                            let resp = Response::builder()
                                .status(status)
                                .header("content-type", content_type)
                                .body(Full::new(Bytes::from(body)))
                                .expect("build response");
                            async move { Ok::<_, Infallible>(resp) }
                        }),
                    )
                    .await;
            });
        }
    });

    (addr, recorded)
}

async fn connect(
    config: EventSourceConfig,
    types: &[&str],
) -> (EventSource, mpsc::UnboundedReceiver<SourceEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut builder = EventSource::builder(config);
    for event_type in types {
        let tx = tx.clone();
        builder = builder.listener(*event_type, move |event: &SourceEvent| {
            let _ = tx.send(event.clone());
        });
    }
    (builder.connect().await.expect("connect"), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SourceEvent>) -> SourceEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout")
        .expect("event")
}

// ---------------------------------------------------------------------------
// Basic connection and event reception
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_basic_connection_and_events() {
    let body = "event: message\ndata: {\"price\":42000}\nid: evt-1\n\nevent: update\ndata: hello world\nid: evt-2\n\n";
    let (addr, _) = start_sse_server(vec![(body, "text/event-stream", 200)]).await;

    let config = EventSourceConfig::new(format!("http://{addr}/stream")).disable_retry(true);
    let (source, mut rx) = connect(config, &["open", "message", "update"]).await;

    assert!(matches!(next_event(&mut rx).await, SourceEvent::Open(_)));

    let event = next_event(&mut rx).await;
    let message = event.as_message().expect("message");
    assert_eq!(event.event_type(), "message");
    assert_eq!(message.data(), "{\"price\":42000}");
    assert_eq!(message.last_event_id(), "evt-1");
    assert_eq!(message.origin(), Some(format!("http://{addr}").as_str()));

    let event = next_event(&mut rx).await;
    let message = event.as_message().expect("message");
    assert_eq!(event.event_type(), "update");
    assert_eq!(message.data(), "hello world");
    assert_eq!(message.last_event_id(), "evt-2");

    timeout(Duration::from_secs(5), source.closed())
        .await
        .expect("closed after stream end");
    assert_eq!(source.ready_state(), ReadyState::Closed);
}

// ---------------------------------------------------------------------------
// Fatal responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_forbidden_closes() {
    let (addr, recorded) = start_sse_server(vec![("", "text/event-stream", 403)]).await;

    let config = EventSourceConfig::new(format!("http://{addr}/stream"))
        .retry(Duration::from_millis(10));
    let (source, mut rx) = connect(config, &["error"]).await;

    let SourceEvent::Error(event) = next_event(&mut rx).await else {
        panic!("expected error event");
    };
    assert_eq!(
        event.response.as_ref().map(|r| r.status),
        Some(http::StatusCode::FORBIDDEN)
    );
    assert!(matches!(
        event.error.as_deref(),
        Some(EventSourceError::InvalidStatus { .. })
    ));

    timeout(Duration::from_secs(5), source.closed())
        .await
        .expect("closed");
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert_eq!(recorded.lock().len(), 1);
}

#[tokio::test]
async fn test_invalid_content_type_closes() {
    let (addr, _) = start_sse_server(vec![("data: test\n\n", "application/json", 200)]).await;

    let config = EventSourceConfig::new(format!("http://{addr}/stream"));
    let (source, mut rx) = connect(config, &["error", "message"]).await;

    let SourceEvent::Error(event) = next_event(&mut rx).await else {
        panic!("expected error event");
    };
    assert!(matches!(
        event.error.as_deref(),
        Some(EventSourceError::InvalidContentType { .. })
    ));
    timeout(Duration::from_secs(5), source.closed())
        .await
        .expect("closed");
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reconnect_resumes_from_last_event_id() {
    let (addr, recorded) = start_sse_server(vec![
        ("retry: 10\nid: 5\ndata: first\n\n", "text/event-stream", 200),
        ("data: second\n\n", "text/event-stream", 200),
    ])
    .await;

    let config = EventSourceConfig::new(format!("http://{addr}/stream"));
    let (source, mut rx) = connect(config, &["message"]).await;

    let first = next_event(&mut rx).await;
    assert_eq!(first.as_message().expect("message").data(), "first");
    let second = next_event(&mut rx).await;
    let second = second.as_message().expect("message");
    assert_eq!(second.data(), "second");
    assert_eq!(second.last_event_id(), "5");
    assert_eq!(source.retry_delay(), Duration::from_millis(10));

    let recorded = recorded.lock().clone();
    assert!(recorded.len() >= 2);
    assert!(recorded[0].get("last-event-id").is_none());
    assert_eq!(
        recorded[1].get("last-event-id").map(|v| v.as_bytes()),
        Some(b"5".as_slice())
    );
    assert_eq!(
        recorded[0].get("accept").map(|v| v.as_bytes()),
        Some(b"text/event-stream".as_slice())
    );
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_close_stops_reconnecting() {
    let (addr, recorded) = start_sse_server(vec![
        ("data: first\n\n", "text/event-stream", 200),
        ("data: second\n\n", "text/event-stream", 200),
    ])
    .await;

    let config = EventSourceConfig::new(format!("http://{addr}/stream"))
        .retry(Duration::from_secs(60));
    let (source, mut rx) = connect(config, &["message"]).await;

    let event = next_event(&mut rx).await;
    assert_eq!(event.as_message().expect("message").data(), "first");

    source.close();
    timeout(Duration::from_secs(5), source.closed())
        .await
        .expect("closed");
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert_eq!(recorded.lock().len(), 1);
}

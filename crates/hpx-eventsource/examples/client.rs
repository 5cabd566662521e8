//! Event Source Client Example
//!
//! Connects to an SSE endpoint, prints default messages and `server-time`
//! events, and closes after three seconds.
//!
//! Run with: `cargo run -p hpx-eventsource --example client`

use std::time::Duration;

use hpx_eventsource::{
    EventSource, EventSourceConfig, EventSourceHandler, MessageEvent, SourceEvent,
};

struct PrintMessages;

impl EventSourceHandler for PrintMessages {
    fn on_message(&self, event: &MessageEvent) {
        println!("onmessage id={:?} data={}", event.last_event_id(), event.data());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EventSourceConfig::new("http://localhost:8080/sse");

    let source = EventSource::builder(config)
        .handler(PrintMessages)
        .listener("server-time", |event: &SourceEvent| {
            if let Some(message) = event.as_message() {
                println!(
                    "server-timestamp id={} data={} origin={:?}",
                    message.last_event_id(),
                    message.data(),
                    message.origin(),
                );
            }
        })
        .listener("error", |event: &SourceEvent| {
            if let Some(err) = event.as_lifecycle().and_then(|e| e.error.as_ref()) {
                eprintln!("error: {err}");
            }
        })
        .connect()
        .await?;

    tokio::time::sleep(Duration::from_secs(3)).await;
    source.close();
    source.closed().await;
    println!("closed, state={}", source.ready_state());
    Ok(())
}

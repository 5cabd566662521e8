//! # hpx-eventsource
//!
//! Server-Sent Events client with resumable reconnection.
//!
//! This crate provides:
//!
//! - **Incremental Parsing**: An I/O-free line splitter and message
//!   accumulator that accept the stream in arbitrary chunks and handle `LF`,
//!   `CR` and `CRLF` line endings across chunk boundaries.
//! - **Connection Engine**: [`EventSource`] drives the `CONNECTING` → `OPEN`
//!   → `CLOSED` lifecycle on a background task, validates responses, and
//!   reconnects after the server-adjustable retry delay with `Last-Event-ID`.
//! - **Pluggable Collaborators**: the [`HttpClient`](client::HttpClient)
//!   (default: reqwest), the [`EventDispatcher`](dispatch::EventDispatcher)
//!   and the [`EventSourceHandler`] callbacks can all be replaced.
//!
//! # Architecture
//!
//! ```text
//! EventSource::builder(config).connect()
//!   └─ spawns background task ──► tokio::spawn(driver.run())
//!        │                              │
//!        │   HttpClient::execute ◄──────┤  (request + cancellation token)
//!        │                              │
//!        │   EventStream ◄── body ◄─────┤  (LineSplitter → MessageAccumulator)
//!        │                              │
//!        └── EventDispatcher ◄──────────┘  ("open", "error", per-type messages)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use hpx_eventsource::{EventSource, EventSourceConfig, SourceEvent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EventSourceConfig::new("https://example.com/stream")
//!     .connect_timeout(Duration::from_secs(10));
//!
//! let source = EventSource::builder(config)
//!     .listener("message", |event: &SourceEvent| {
//!         if let Some(message) = event.as_message() {
//!             println!("id={} data={}", message.last_event_id(), message.data());
//!         }
//!     })
//!     .connect()
//!     .await?;
//!
//! source.closed().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Index
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`EventSourceConfig`] builder |
//! | [`connection`] | [`EventSource`], [`EventSourceBuilder`] |
//! | [`client`] | [`HttpClient`](client::HttpClient) trait and the reqwest client |
//! | [`dispatch`] | Listener registry |
//! | [`parse`] | Line splitter, message accumulator, [`EventStream`](parse::EventStream) |
//! | [`handlers`] | Ready-to-use [`EventSourceHandler`]s |

pub mod client;
mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod parse;
mod protocol;
mod types;

// Re-export config types
pub use config::{CredentialsMode, DEFAULT_RETRY, EventSourceConfig};
// Re-export connection types
pub use connection::{EventSource, EventSourceBuilder};
pub use error::{EventSourceError, EventSourceResult};
// Re-export protocol types
pub use protocol::EventSourceHandler;
// Re-export core types
pub use types::{
    ERROR_EVENT, LifecycleEvent, MESSAGE_EVENT, MessageEvent, OPEN_EVENT, ReadyState,
    RequestInfo, ResponseInfo, SourceEvent,
};

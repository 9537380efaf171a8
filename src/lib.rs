//! Multi-protocol streaming response engine.
//!
//! One request-handling endpoint streams output to a caller over whichever
//! wire protocol the caller negotiated (chunked HTTP, WebSocket, or
//! server-push events) through a single producer API: emit a chunk, close
//! the stream.
//!
//! # Architecture Overview
//!
//! ```text
//! inbound request (StreamRequest)
//!     → connection (per-request state machine, next-tick startup)
//!     → wrapped application returns (status, headers, body)
//!     → handler registry picks a protocol handler (most-recent-wins)
//!     → handler opens the transport and frames outgoing chunks
//!     → backpressure queue drains one item per tick into the host sink
//!     → queue completion is the signal the host waits on
//!
//!               Cross-Cutting Concerns
//!     config | hooks (before/after pipeline) | tracing
//! ```
//!
//! Everything runs on one logical task queue (the [`reactor`]): producers
//! enqueue at their own pace, the transport consumes at the network's pace,
//! and ordering guarantees come from strict tick ordering rather than locks.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod queue;
pub mod reactor;
pub mod request;

pub use config::StreamConfig;
pub use connection::{AppResponse, Connection, State};
pub use error::{StreamError, StreamResult};
pub use handler::{Handler, HandlerEntry, HandlerRegistry};
pub use queue::BackpressureQueue;
pub use reactor::{Reactor, Scheduler};
pub use request::StreamRequest;

//! Protocol handler abstraction: selection and framing.
//!
//! # Responsibilities
//! - Define the [`Handler`] contract (open transport, frame chunks, close)
//! - Select a handler for each request via an ordered registry
//!
//! # Design Decisions
//! - The registry is an explicit, inspectable list populated at setup time
//!   and searched linearly; no open-ended dynamic dispatch.
//! - First-registered entries have *lowest* priority: the most recently
//!   registered handler whose predicate matches wins. The catch-all
//!   chunked handler is registered first so a match always exists.
//! - Each handler owns one backpressure queue; header mutation for chunk
//!   encoding belongs to the handler, never to the connection.

pub mod chunked;
pub mod event_source;
pub mod websocket;

pub use chunked::ChunkedTransfer;
pub use event_source::EventSource;
pub use websocket::WebSocket;

use std::rc::Rc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::queue::BackpressureQueue;
use crate::reactor::Scheduler;
use crate::request::{MessageSocket, Responder, StreamRequest};

/// Everything a handler may touch while opening the transport.
///
/// Headers are the connection's own map, still mutable at this point; the
/// capabilities are taken out of the request, at most once each.
pub struct OpenContext<'a> {
    pub status: StatusCode,
    pub headers: &'a mut HeaderMap,
    pub responder: Option<Responder>,
    pub socket: Option<Rc<dyn MessageSocket>>,
}

/// A protocol-specific strategy: open a transport, frame outgoing content,
/// tear the transport down.
pub trait Handler {
    /// Handler name, reported by `Connection::stream_transport`.
    fn name(&self) -> &'static str;

    /// The queue holding this handler's not-yet-flushed output.
    fn queue(&self) -> &BackpressureQueue;

    /// Transport-specific handshake/activation. Data may start flowing to
    /// the network after this returns.
    fn open(&mut self, ctx: &mut OpenContext<'_>) -> StreamResult<()>;

    /// Transport-specific teardown, run before the queue is completed.
    fn shutdown(&mut self);

    /// Frame items and enqueue them. Default: no framing.
    fn chunk(&mut self, chunks: Vec<Bytes>) {
        self.queue().enqueue(chunks);
    }

    /// Tear down and complete the queue. Anything `shutdown` enqueues lands
    /// ahead of `finish`, so protocol tails are the last items delivered.
    fn close(&mut self, flush: bool) {
        self.shutdown();
        self.queue().finish(flush);
    }
}

type AcceptFn = Box<dyn Fn(&StreamRequest) -> bool>;
type BuildFn = Box<dyn Fn(Rc<dyn Scheduler>) -> Box<dyn Handler>>;

/// One registered protocol: a name, an acceptance predicate, and a factory.
pub struct HandlerEntry {
    name: &'static str,
    accepts: AcceptFn,
    build: BuildFn,
}

impl HandlerEntry {
    pub fn new<A, B>(name: &'static str, accepts: A, build: B) -> Self
    where
        A: Fn(&StreamRequest) -> bool + 'static,
        B: Fn(Rc<dyn Scheduler>) -> Box<dyn Handler> + 'static,
    {
        Self {
            name,
            accepts: Box::new(accepts),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered set of registered protocols.
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
}

impl HandlerRegistry {
    /// A registry with no entries; `find` on it always fails.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build the default set honoring config toggles. The chunked handler
    /// is always present as the catch-all.
    pub fn from_config(config: &StreamConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(HandlerEntry::new(
            "chunked",
            |_| true,
            |scheduler| Box::new(ChunkedTransfer::new(scheduler)),
        ));
        if config.event_source_enabled {
            registry.register(HandlerEntry::new(
                "event_source",
                event_source::accepts,
                |scheduler| Box::new(EventSource::new(scheduler)),
            ));
        }
        if config.websocket_enabled {
            registry.register(HandlerEntry::new(
                "websocket",
                websocket::accepts,
                |scheduler| Box::new(WebSocket::new(scheduler)),
            ));
        }
        registry
    }

    /// Append an entry. Later registrations take precedence in `find`.
    pub fn register(&mut self, entry: HandlerEntry) {
        self.entries.push(entry);
    }

    /// Registered handler names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// Instantiate a handler for the first matching entry, scanning the
    /// most recently registered first.
    pub fn find(
        &self,
        request: &StreamRequest,
        scheduler: Rc<dyn Scheduler>,
    ) -> StreamResult<Box<dyn Handler>> {
        for entry in self.entries.iter().rev() {
            if (entry.accepts)(request) {
                tracing::debug!(handler = entry.name, "selected stream handler");
                return Ok((entry.build)(scheduler));
            }
        }
        Err(StreamError::HandlerNotFound)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;

    struct Stub {
        queue: BackpressureQueue,
        name: &'static str,
    }

    impl Handler for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn queue(&self) -> &BackpressureQueue {
            &self.queue
        }
        fn open(&mut self, _ctx: &mut OpenContext<'_>) -> StreamResult<()> {
            Ok(())
        }
        fn shutdown(&mut self) {}
    }

    fn stub_entry(name: &'static str, accepts: fn(&StreamRequest) -> bool) -> HandlerEntry {
        HandlerEntry::new(name, accepts, move |scheduler| {
            Box::new(Stub {
                queue: BackpressureQueue::new(scheduler),
                name,
            })
        })
    }

    #[test]
    fn most_recently_registered_match_wins() {
        let reactor = Reactor::new();
        let mut registry = HandlerRegistry::empty();
        registry.register(stub_entry("fallback", |_| true));
        registry.register(stub_entry("preferred", |_| true));

        let request = StreamRequest::builder().build();
        let handler = registry.find(&request, reactor).unwrap();
        assert_eq!(handler.name(), "preferred");
    }

    #[test]
    fn falls_through_non_matching_entries() {
        let reactor = Reactor::new();
        let mut registry = HandlerRegistry::empty();
        registry.register(stub_entry("fallback", |_| true));
        registry.register(stub_entry("picky", |_| false));

        let request = StreamRequest::builder().build();
        let handler = registry.find(&request, reactor).unwrap();
        assert_eq!(handler.name(), "fallback");
    }

    #[test]
    fn empty_registry_reports_not_found() {
        let reactor = Reactor::new();
        let registry = HandlerRegistry::empty();
        let request = StreamRequest::builder().build();

        assert!(matches!(
            registry.find(&request, reactor),
            Err(StreamError::HandlerNotFound)
        ));
    }

    #[test]
    fn default_registry_order() {
        let registry = HandlerRegistry::default();
        assert_eq!(registry.names(), vec!["chunked", "event_source", "websocket"]);
    }

    #[test]
    fn config_toggles_drop_optional_handlers() {
        let config = StreamConfig {
            websocket_enabled: false,
            event_source_enabled: false,
            ..StreamConfig::default()
        };
        let registry = HandlerRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["chunked"]);
    }
}

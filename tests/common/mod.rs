//! Shared fixtures: a mock host environment standing in for the server.
//!
//! `MockHost` plays the host's role end to end: it supplies the
//! asynchronous-response capability, records the committed head, attaches a
//! sink that appends streamed bytes to a buffer, and observes completion.
//! `MockSocket` stands in for an upgraded transport (WebSocket/EventSource).

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use spout::queue::Completion;
use spout::request::{MessageSocket, ResponseHead, StreamRequestBuilder};
use spout::{BackpressureQueue, StreamRequest};

static TRACING_INIT: Once = Once::new();

/// Install an env-filter subscriber so `RUST_LOG=debug cargo test` shows
/// engine tracing. Only the first call takes effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Everything the host observes for one request.
#[derive(Default)]
pub struct Observed {
    pub head: Option<ResponseHead>,
    pub body: Vec<u8>,
    pub completion: Option<Completion>,
}

pub struct MockHost {
    observed: Rc<RefCell<Observed>>,
    queue: Rc<RefCell<Option<BackpressureQueue>>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            observed: Rc::new(RefCell::new(Observed::default())),
            queue: Rc::new(RefCell::new(None)),
        }
    }

    /// A request builder pre-wired with this host's responder capability.
    pub fn request(&self) -> StreamRequestBuilder {
        let observed = self.observed.clone();
        let queue_slot = self.queue.clone();
        StreamRequest::builder().responder(move |head, queue| {
            observed.borrow_mut().head = Some(head);
            *queue_slot.borrow_mut() = Some(queue.clone());

            let sink_observed = observed.clone();
            queue.attach_sink(move |chunk: Bytes| {
                sink_observed.borrow_mut().body.extend_from_slice(&chunk);
            });

            let done_observed = observed.clone();
            queue.on_success(move || {
                done_observed.borrow_mut().completion = Some(Completion::Succeeded);
            });
            let failed_observed = observed.clone();
            queue.on_failure(move || {
                failed_observed.borrow_mut().completion = Some(Completion::Failed);
            });
        })
    }

    /// The body queue the responder adopted, once the head is committed.
    pub fn queue(&self) -> Option<BackpressureQueue> {
        self.queue.borrow().clone()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.observed.borrow().head.as_ref().map(|h| h.status)
    }

    pub fn headers(&self) -> Option<HeaderMap> {
        self.observed.borrow().head.as_ref().map(|h| h.headers.clone())
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers()?
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    pub fn body(&self) -> Vec<u8> {
        self.observed.borrow().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8(self.body()).expect("body is utf-8 in tests")
    }

    pub fn completion(&self) -> Option<Completion> {
        self.observed.borrow().completion
    }
}

/// Message-oriented transport that records what was sent.
///
/// The handshake is considered already complete: the open notification
/// fires as soon as the handler registers it.
#[derive(Default)]
pub struct MockSocket {
    pub sent: RefCell<Vec<Bytes>>,
    pub close_code: Cell<Option<Option<u16>>>,
}

impl MockSocket {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn sent_strings(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .map(|m| String::from_utf8_lossy(m).into_owned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.close_code.get().is_some()
    }
}

impl MessageSocket for MockSocket {
    fn on_open(&self, f: Box<dyn FnOnce()>) {
        f();
    }

    fn send(&self, message: Bytes) {
        self.sent.borrow_mut().push(message);
    }

    fn close(&self, code: Option<u16>) {
        self.close_code.set(Some(code));
    }
}

//! Inbound request context and host capabilities.
//!
//! # Responsibilities
//! - Carry enough of the request for handler `accepts` predicates to
//!   classify the protocol (method, uri, headers)
//! - Carry the host's asynchronous-response capability: the callback that
//!   commits `(status, headers, body queue)` once a handler opens
//! - Carry an optional message-oriented transport for upgraded protocols
//!   (WebSocket / EventSource); the transport owns its own wire framing
//!
//! The host dispatch mechanism that builds this context is out of scope;
//! anything that can fill in the builder can drive the engine.

use std::rc::Rc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

use crate::queue::BackpressureQueue;

/// Response head handed to the host's asynchronous-response callback.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Host capability: commit a response head and adopt the body queue.
///
/// The host attaches a sink to the queue to receive framed bytes and waits
/// on the queue's completion before reclaiming the network connection.
pub type Responder = Box<dyn FnOnce(ResponseHead, BackpressureQueue)>;

/// Host capability: a message-oriented transport for upgraded protocols.
///
/// Implementations complete their own handshake and wire framing; the
/// engine only needs open notification, send, and close.
pub trait MessageSocket {
    /// Register the open notification; called once the handshake completes.
    fn on_open(&self, f: Box<dyn FnOnce()>);

    /// Send one message to the peer.
    fn send(&self, message: Bytes);

    /// Close the transport, optionally with a protocol close code.
    fn close(&self, code: Option<u16>);
}

/// The per-request context the engine works against.
pub struct StreamRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    responder: Option<Responder>,
    socket: Option<Rc<dyn MessageSocket>>,
}

impl StreamRequest {
    pub fn builder() -> StreamRequestBuilder {
        StreamRequestBuilder::default()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the host can defer delivery of the response.
    pub fn has_responder(&self) -> bool {
        self.responder.is_some()
    }

    /// Take the async-response capability; at most one caller gets it.
    pub fn take_responder(&mut self) -> Option<Responder> {
        self.responder.take()
    }

    /// The upgraded-transport capability, if the host negotiated one.
    pub fn socket(&self) -> Option<Rc<dyn MessageSocket>> {
        self.socket.clone()
    }
}

/// Builder for [`StreamRequest`].
#[derive(Default)]
pub struct StreamRequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    responder: Option<Responder>,
    socket: Option<Rc<dyn MessageSocket>>,
}

impl StreamRequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn responder<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ResponseHead, BackpressureQueue) + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn socket(mut self, socket: Rc<dyn MessageSocket>) -> Self {
        self.socket = Some(socket);
        self
    }

    pub fn build(self) -> StreamRequest {
        StreamRequest {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            responder: self.responder,
            socket: self.socket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_is_taken_once() {
        let mut request = StreamRequest::builder()
            .responder(|_head, _queue| {})
            .build();

        assert!(request.has_responder());
        assert!(request.take_responder().is_some());
        assert!(request.take_responder().is_none());
        assert!(!request.has_responder());
    }

    #[test]
    fn builder_collects_headers() {
        let request = StreamRequest::builder()
            .method(Method::GET)
            .header(
                http::header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            )
            .build();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(
            request.headers().get(http::header::ACCEPT).unwrap(),
            "text/event-stream"
        );
    }
}

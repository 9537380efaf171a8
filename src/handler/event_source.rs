//! EventSource (server-push events) handler.
//!
//! Same shape as the WebSocket handler: the host's message-socket
//! capability owns the `text/event-stream` wire framing, this handler owns
//! sink attachment and teardown ordering.

use std::rc::Rc;

use bytes::Bytes;
use http::header;

use crate::error::{StreamError, StreamResult};
use crate::queue::BackpressureQueue;
use crate::reactor::Scheduler;
use crate::request::{MessageSocket, StreamRequest};

use super::{Handler, OpenContext};

/// True for requests whose `Accept` header asks for an event stream.
pub fn accepts(request: &StreamRequest) -> bool {
    request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Streams each chunk as one server-sent event.
pub struct EventSource {
    queue: BackpressureQueue,
    socket: Option<Rc<dyn MessageSocket>>,
}

impl EventSource {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            queue: BackpressureQueue::new(scheduler),
            socket: None,
        }
    }
}

impl Handler for EventSource {
    fn name(&self) -> &'static str {
        "event_source"
    }

    fn queue(&self) -> &BackpressureQueue {
        &self.queue
    }

    fn open(&mut self, ctx: &mut OpenContext<'_>) -> StreamResult<()> {
        let socket = ctx.socket.take().ok_or(StreamError::UnsupportedServer)?;
        self.socket = Some(socket.clone());

        let queue = self.queue.clone();
        let writer = socket.clone();
        socket.on_open(Box::new(move || {
            queue.attach_sink(move |event: Bytes| writer.send(event));
        }));
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(socket) = self.socket.clone() {
            self.queue.on_success(move || socket.close(None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn accepts_event_stream_requests_only() {
        let plain = StreamRequest::builder().build();
        assert!(!accepts(&plain));

        let sse = StreamRequest::builder()
            .header(
                header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            )
            .build();
        assert!(accepts(&sse));
    }
}

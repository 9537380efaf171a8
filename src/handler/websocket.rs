//! WebSocket handler.
//!
//! Delegates the handshake and frame encoding to the host's message-socket
//! capability; this handler only decides when the sink attaches (once the
//! socket reports itself open) and when the close control frame goes out
//! (once the queue completes successfully).

use std::rc::Rc;

use bytes::Bytes;
use http::header;

use crate::error::{StreamError, StreamResult};
use crate::queue::BackpressureQueue;
use crate::reactor::Scheduler;
use crate::request::{MessageSocket, StreamRequest};

use super::{Handler, OpenContext};

/// RFC 6455 normal-closure code.
const NORMAL_CLOSURE: u16 = 1000;

/// True for requests carrying a `Upgrade: websocket` token.
pub fn accepts(request: &StreamRequest) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Streams each chunk as one WebSocket message.
pub struct WebSocket {
    queue: BackpressureQueue,
    socket: Option<Rc<dyn MessageSocket>>,
}

impl WebSocket {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            queue: BackpressureQueue::new(scheduler),
            socket: None,
        }
    }
}

impl Handler for WebSocket {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn queue(&self) -> &BackpressureQueue {
        &self.queue
    }

    fn open(&mut self, ctx: &mut OpenContext<'_>) -> StreamResult<()> {
        let socket = ctx.socket.take().ok_or(StreamError::UnsupportedServer)?;
        self.socket = Some(socket.clone());

        // Messages may only flow once the transport reports itself open.
        let queue = self.queue.clone();
        let writer = socket.clone();
        socket.on_open(Box::new(move || {
            queue.attach_sink(move |message: Bytes| writer.send(message));
        }));
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(socket) = self.socket.clone() {
            self.queue
                .on_success(move || socket.close(Some(NORMAL_CLOSURE)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn upgrade_detection_is_case_insensitive() {
        let upper = StreamRequest::builder()
            .header(header::UPGRADE, HeaderValue::from_static("WebSocket"))
            .build();
        assert!(accepts(&upper));

        let other = StreamRequest::builder()
            .header(header::UPGRADE, HeaderValue::from_static("h2c"))
            .build();
        assert!(!accepts(&other));

        assert!(!accepts(&StreamRequest::builder().build()));
    }
}

//! Chunked transfer-encoding handler (the catch-all default).
//!
//! Works under any host exposing the asynchronous-response capability.
//! Frames every item with standard chunked-transfer encoding:
//! `<hex length>\r\n<raw bytes>\r\n`, terminated by one `0\r\n\r\n` tail.

use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};
use http::header;
use http::HeaderValue;

use crate::error::{StreamError, StreamResult};
use crate::queue::BackpressureQueue;
use crate::reactor::Scheduler;

use super::{Handler, OpenContext};

const TERM: &[u8] = b"\r\n";
const TAIL: &[u8] = b"0\r\n\r\n";

/// Streams the body with `Transfer-Encoding: chunked`.
pub struct ChunkedTransfer {
    queue: BackpressureQueue,
    tail_sent: bool,
}

impl ChunkedTransfer {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            queue: BackpressureQueue::new(scheduler),
            tail_sent: false,
        }
    }
}

/// Frame one item. Empty items are dropped: a zero-length chunk would read
/// as the stream terminator on the wire.
fn encode_chunk(content: &Bytes) -> Option<Bytes> {
    if content.is_empty() {
        return None;
    }
    let mut framed = BytesMut::with_capacity(content.len() + 16);
    framed.put_slice(format!("{:x}", content.len()).as_bytes());
    framed.put_slice(TERM);
    framed.put_slice(content);
    framed.put_slice(TERM);
    Some(framed.freeze())
}

impl Handler for ChunkedTransfer {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn queue(&self) -> &BackpressureQueue {
        &self.queue
    }

    fn open(&mut self, ctx: &mut OpenContext<'_>) -> StreamResult<()> {
        ctx.headers
            .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        // Chunked encoding and a fixed length are mutually exclusive.
        ctx.headers.remove(header::CONTENT_LENGTH);

        let responder = ctx.responder.take().ok_or(StreamError::UnsupportedServer)?;
        responder(
            crate::request::ResponseHead {
                status: ctx.status,
                headers: ctx.headers.clone(),
            },
            self.queue.clone(),
        );
        Ok(())
    }

    fn chunk(&mut self, chunks: Vec<Bytes>) {
        self.queue
            .enqueue(chunks.iter().filter_map(encode_chunk));
    }

    fn shutdown(&mut self) {
        // The tail is pre-framed and must be the last item ever enqueued.
        if !self.tail_sent {
            self.tail_sent = true;
            self.queue.enqueue([Bytes::from_static(TAIL)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Completion;
    use crate::reactor::Reactor;
    use std::cell::RefCell;

    fn collected(handler: &ChunkedTransfer) -> Rc<RefCell<Vec<u8>>> {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink_out = out.clone();
        handler
            .queue()
            .attach_sink(move |item| sink_out.borrow_mut().extend_from_slice(&item));
        out
    }

    #[test]
    fn frames_with_hex_length_and_crlf() {
        assert_eq!(
            encode_chunk(&Bytes::from_static(b"Chunky ")).unwrap(),
            "7\r\nChunky \r\n"
        );
        assert_eq!(
            encode_chunk(&Bytes::from_static(&[0u8; 26])).unwrap()[..4],
            b"1a\r\n"[..]
        );
    }

    #[test]
    fn drops_empty_chunks() {
        assert!(encode_chunk(&Bytes::new()).is_none());

        let reactor = Reactor::new();
        let mut handler = ChunkedTransfer::new(reactor.clone());
        let out = collected(&handler);

        handler.chunk(vec![Bytes::new(), Bytes::from_static(b"x")]);
        reactor.run();

        assert_eq!(*out.borrow(), b"1\r\nx\r\n");
    }

    #[test]
    fn tail_is_last_and_sent_once() {
        let reactor = Reactor::new();
        let mut handler = ChunkedTransfer::new(reactor.clone());
        let out = collected(&handler);

        handler.chunk(vec![Bytes::from_static(b"Monkey")]);
        handler.close(true);
        handler.shutdown();
        reactor.run();

        assert_eq!(*out.borrow(), b"6\r\nMonkey\r\n0\r\n\r\n");
        assert_eq!(handler.queue().completion(), Completion::Succeeded);
    }
}

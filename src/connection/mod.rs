//! Per-request connection state machine.
//!
//! # Responsibilities
//! - Track connection state (new → open → closed, or → errored)
//! - Invoke the wrapped application and drain its body into the stream
//! - Select and drive the protocol handler
//! - Run the before/after hook pipeline around every lifecycle event
//! - Enforce state preconditions through a single gating function
//!
//! # Data Flow
//! ```text
//! Connection::start (defers one tick)
//!     → check async-response capability
//!     → app returns (status, headers, body); body drained via chunk()
//!     → registry selects handler, pre-open chunks flush into it
//!     → handler.open() commits the response head
//!     → state = open, headers freeze
//!     → after_open hooks (default: close immediately)
//! ```

pub mod hooks;

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::handler::{Handler, HandlerRegistry, OpenContext};
use crate::reactor::Scheduler;
use crate::request::StreamRequest;

use hooks::HookTable;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, carried on every tracing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Connection lifecycle state. Monotonic: nothing leaves `Closed` or
/// `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created; response head still mutable, handler not yet selected.
    New,
    /// Handler bound, response head committed and frozen.
    Open,
    /// Terminal: closed in an orderly fashion.
    Closed,
    /// Terminal: torn down after an invariant violation or transport loss.
    Errored,
}

const NEW_ONLY: &[State] = &[State::New];
const OPEN_ONLY: &[State] = &[State::Open];
const NEW_OR_OPEN: &[State] = &[State::New, State::Open];

/// What the wrapped application returns: the initial response triple.
#[derive(Default)]
pub struct AppResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<Bytes>,
}

struct Inner {
    id: ConnectionId,
    scheduler: Rc<dyn Scheduler>,
    registry: Rc<HandlerRegistry>,
    config: StreamConfig,
    app: Rc<dyn Fn(&Connection) -> AppResponse>,
    request: RefCell<StreamRequest>,
    state: Cell<State>,
    status: Cell<StatusCode>,
    headers: RefCell<HeaderMap>,
    hooks: RefCell<HookTable>,
    handler: RefCell<Option<Box<dyn Handler>>>,
    /// Chunks issued before the handler exists; flushed on selection.
    early_chunks: RefCell<Vec<Bytes>>,
}

/// Cloneable handle to one per-request connection.
///
/// All state is interior and single-threaded; clones are handed to hooks
/// and to the queue-failure path, never across tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<Inner>,
}

impl Connection {
    /// Create a connection for one inbound request.
    pub fn new<A>(
        app: A,
        request: StreamRequest,
        registry: Rc<HandlerRegistry>,
        scheduler: Rc<dyn Scheduler>,
        config: StreamConfig,
    ) -> Self
    where
        A: Fn(&Connection) -> AppResponse + 'static,
    {
        Self {
            inner: Rc::new(Inner {
                id: ConnectionId::next(),
                scheduler,
                registry,
                config,
                app: Rc::new(app),
                request: RefCell::new(request),
                state: Cell::new(State::New),
                status: Cell::new(StatusCode::OK),
                headers: RefCell::new(HeaderMap::new()),
                hooks: RefCell::new(HookTable::default()),
                handler: RefCell::new(None),
                early_chunks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Kick off the startup sequence on the next scheduling tick.
    pub fn start(&self) {
        let conn = self.clone();
        self.inner.scheduler.next_tick(move || {
            if let Err(err) = conn.open_sequence() {
                conn.error_out(err);
            }
        });
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    pub fn is_new(&self) -> bool {
        self.state() == State::New
    }

    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn is_errored(&self) -> bool {
        self.state() == State::Errored
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status.get()
    }

    pub fn headers(&self) -> Ref<'_, HeaderMap> {
        self.inner.headers.borrow()
    }

    pub fn request(&self) -> Ref<'_, StreamRequest> {
        self.inner.request.borrow()
    }

    /// Name of the handler actually selected, for diagnostics and tests.
    pub fn stream_transport(&self) -> Option<&'static str> {
        self.inner.handler.borrow().as_ref().map(|h| h.name())
    }

    /// Set the result status. Legal only while `new`.
    pub fn set_status(&self, status: StatusCode) -> StreamResult<()> {
        self.guard("set_status", NEW_ONLY)?;
        self.inner.status.set(status);
        Ok(())
    }

    /// Replace the response headers. Legal only while `new`; headers freeze
    /// the instant the connection opens.
    pub fn set_headers(&self, headers: HeaderMap) -> StreamResult<()> {
        self.guard("set_headers", NEW_ONLY)?;
        *self.inner.headers.borrow_mut() = headers;
        Ok(())
    }

    /// Insert one response header. Legal only while `new`.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> StreamResult<()> {
        self.guard("insert_header", NEW_ONLY)?;
        self.inner.headers.borrow_mut().insert(name, value);
        Ok(())
    }

    /// Emit chunks. Legal while `new` (buffered until the handler is
    /// selected, order preserved) or `open` (framed and enqueued).
    pub fn chunk<I: IntoIterator<Item = Bytes>>(&self, chunks: I) -> StreamResult<()> {
        self.guard("chunk", NEW_OR_OPEN)?;
        let original: Vec<Bytes> = chunks.into_iter().collect();
        let mutated = self.fold_before_chunk(original.clone());

        if let Some(handler) = self.inner.handler.borrow_mut().as_mut() {
            handler.chunk(mutated);
        } else {
            self.inner.early_chunks.borrow_mut().extend(mutated);
        }

        self.run_hooks(|t| &mut t.after_chunk, |hook| hook(&original));
        Ok(())
    }

    /// Close the stream. Legal only while `open`.
    ///
    /// Runs one tick later so callers may `chunk` immediately before
    /// `close` without ordering hazards. With `flush`, completion waits for
    /// every enqueued item; without it, teardown is immediate.
    pub fn close(&self, flush: bool) -> StreamResult<()> {
        self.guard("close", OPEN_ONLY)?;
        let conn = self.clone();
        self.inner.scheduler.next_tick(move || conn.close_sequence(flush));
        Ok(())
    }

    /// Notify `after_connection_error` hooks. Does not change state; the
    /// triggering error path owns the transition.
    pub fn report_connection_error(&self) {
        self.run_hooks(|t| &mut t.after_connection_error, |hook| hook());
    }

    // Hook registration. Each returns the connection for chaining.

    pub fn after_open<F: FnMut() + 'static>(&self, f: F) -> &Self {
        self.inner.hooks.borrow_mut().after_open.push(Box::new(f));
        self
    }

    pub fn before_chunk<F: FnMut(Vec<Bytes>) -> Vec<Bytes> + 'static>(&self, f: F) -> &Self {
        self.inner.hooks.borrow_mut().before_chunk.push(Box::new(f));
        self
    }

    pub fn after_chunk<F: FnMut(&[Bytes]) + 'static>(&self, f: F) -> &Self {
        self.inner.hooks.borrow_mut().after_chunk.push(Box::new(f));
        self
    }

    pub fn before_close<F: FnMut() + 'static>(&self, f: F) -> &Self {
        self.inner.hooks.borrow_mut().before_close.push(Box::new(f));
        self
    }

    pub fn after_close<F: FnMut() + 'static>(&self, f: F) -> &Self {
        self.inner.hooks.borrow_mut().after_close.push(Box::new(f));
        self
    }

    pub fn after_connection_error<F: FnMut() + 'static>(&self, f: F) -> &Self {
        self.inner
            .hooks
            .borrow_mut()
            .after_connection_error
            .push(Box::new(f));
        self
    }

    /// Startup: transition from `new` to `open`.
    fn open_sequence(&self) -> StreamResult<()> {
        if !self.inner.request.borrow().has_responder() {
            return Err(StreamError::UnsupportedServer);
        }

        // Invoke the wrapped application; its triple seeds the response.
        let app = self.inner.app.clone();
        let response = app.as_ref()(self);
        if self.state() != State::New {
            // The app tripped the error path mid-call; startup is moot.
            return Ok(());
        }
        self.inner.status.set(response.status);
        *self.inner.headers.borrow_mut() = response.headers;
        for piece in response.body {
            self.chunk([piece])?;
        }

        // Every connection terminates even if the app streams nothing more.
        // Captured weakly: hooks live inside the connection, so a strong
        // handle here would keep the connection alive forever.
        if self.inner.hooks.borrow().after_open.is_empty() {
            let conn = Rc::downgrade(&self.inner);
            self.after_open(move || {
                if let Some(conn) = Connection::upgrade(&conn) {
                    let _ = conn.close(true);
                }
            });
        }

        let mut handler = {
            let request = self.inner.request.borrow();
            self.inner
                .registry
                .find(&request, self.inner.scheduler.clone())?
        };

        // Pre-open chunks flush into the handler before it opens; nothing
        // is lost or reordered.
        let early = std::mem::take(&mut *self.inner.early_chunks.borrow_mut());
        if !early.is_empty() {
            handler.chunk(early);
        }

        {
            let mut request = self.inner.request.borrow_mut();
            let mut headers = self.inner.headers.borrow_mut();
            let mut ctx = OpenContext {
                status: self.inner.status.get(),
                headers: &mut headers,
                responder: request.take_responder(),
                socket: request.socket(),
            };
            handler.open(&mut ctx)?;
        }

        // Transport loss surfaces only through the queue's failure signal.
        // Weak for the same reason as above: the callback is stored in the
        // handler's queue, which the connection itself owns.
        let conn = Rc::downgrade(&self.inner);
        handler.queue().on_failure(move || {
            let Some(conn) = Connection::upgrade(&conn) else {
                return;
            };
            tracing::warn!(connection_id = %conn.inner.id, "transport reported a connection failure");
            if !matches!(conn.state(), State::Closed | State::Errored) {
                conn.inner.state.set(State::Errored);
            }
            conn.report_connection_error();
            conn.release_hooks_later();
        });

        let transport = handler.name();
        *self.inner.handler.borrow_mut() = Some(handler);
        self.inner.state.set(State::Open);
        tracing::debug!(connection_id = %self.inner.id, transport, "connection open");

        self.run_hooks(|t| &mut t.after_open, |hook| hook());
        Ok(())
    }

    /// Deferred close: before hooks, state flip, handler teardown, after
    /// hooks: one unit, never interleaved with other events.
    fn close_sequence(&self, flush: bool) {
        if self.state() != State::Open {
            return;
        }
        // Still open here: before_close hooks may emit final chunks.
        self.run_hooks(|t| &mut t.before_close, |hook| hook());
        if self.state() != State::Open {
            // A before_close hook drove the connection into error.
            return;
        }

        self.inner.state.set(State::Closed);
        if let Some(handler) = self.inner.handler.borrow_mut().as_mut() {
            handler.close(flush);
        }
        tracing::debug!(connection_id = %self.inner.id, flush, "connection closed");

        self.run_hooks(|t| &mut t.after_close, |hook| hook());
        // Terminal: no hook will ever run again. Registered hooks often hold
        // connection handles, so keeping them would leak the whole request.
        *self.inner.hooks.borrow_mut() = HookTable::default();
    }

    /// The single state gate every mutator goes through. A violation trips
    /// the connection's own error path before the error is returned.
    fn guard(&self, operation: &'static str, allowed: &'static [State]) -> StreamResult<()> {
        let current = self.state();
        if allowed.contains(&current) {
            return Ok(());
        }
        let err = StreamError::StateConstraint {
            operation,
            allowed,
            current,
        };
        self.error_out(err.clone());
        Err(err)
    }

    /// Skip remaining chunks and tear the connection down.
    fn error_out(&self, err: StreamError) {
        tracing::error!(connection_id = %self.inner.id, error = %err, "stream aborted");
        let state = self.state();
        if matches!(state, State::Closed | State::Errored) {
            // Terminal states stay terminal.
            return;
        }
        if state == State::New {
            let status = StatusCode::from_u16(self.inner.config.error_status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            self.inner.status.set(status);
        }
        self.inner.state.set(State::Errored);
        if let Some(handler) = self.inner.handler.borrow_mut().as_mut() {
            handler.close(false);
        }
        self.release_hooks_later();
    }

    /// Drop every registered hook once the connection is terminal; hooks
    /// hold connection handles, so retaining them leaks the request's
    /// resources. Deferred one tick because the error path can fire while a
    /// hook list is mid-run and must be reinstated first.
    fn release_hooks_later(&self) {
        let inner = Rc::downgrade(&self.inner);
        self.inner.scheduler.next_tick(move || {
            if let Some(inner) = inner.upgrade() {
                *inner.hooks.borrow_mut() = HookTable::default();
            }
        });
    }

    fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Fold the batch through before_chunk hooks, left to right.
    fn fold_before_chunk(&self, chunks: Vec<Bytes>) -> Vec<Bytes> {
        let mut taken = std::mem::take(&mut self.inner.hooks.borrow_mut().before_chunk);
        let mut batch = chunks;
        for hook in taken.iter_mut() {
            batch = hook(batch);
        }
        self.reinstate(|t| &mut t.before_chunk, taken);
        batch
    }

    /// Run one hook list without holding the table borrow, so hooks may
    /// register further hooks while running.
    fn run_hooks<T>(
        &self,
        select: impl for<'a> Fn(&'a mut HookTable) -> &'a mut Vec<T>,
        mut invoke: impl FnMut(&mut T),
    ) {
        let mut taken = std::mem::take(select(&mut self.inner.hooks.borrow_mut()));
        for hook in taken.iter_mut() {
            invoke(hook);
        }
        self.reinstate(select, taken);
    }

    /// Put a taken hook list back, keeping hooks registered mid-run after
    /// the originals.
    fn reinstate<T>(
        &self,
        select: impl for<'a> Fn(&'a mut HookTable) -> &'a mut Vec<T>,
        mut taken: Vec<T>,
    ) {
        let mut table = self.inner.hooks.borrow_mut();
        let list = select(&mut table);
        taken.append(list);
        *list = taken;
    }
}

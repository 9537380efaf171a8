//! Backpressure queue decoupling producer pace from consumer pace.
//!
//! # Responsibilities
//! - Buffer not-yet-flushed output in strict FIFO order (unbounded)
//! - Drain one item per scheduler tick into the single attached sink
//! - Expose a one-shot tri-state completion the host waits on
//!
//! # Design Decisions
//! - Drains are always scheduled, never synchronous, so producer code is
//!   never re-entered during delivery.
//! - One item per tick yields control back to the scheduler between
//!   deliveries; other queued work is not starved by a long drain.
//! - `finish(flush: true)` re-arms itself each tick until the queue is
//!   empty, so completion is only observed after every prior item is out.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;

use crate::reactor::{Scheduler, Task};

/// One-shot completion state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Pending,
    Succeeded,
    Failed,
}

struct Inner {
    scheduler: Rc<dyn Scheduler>,
    pending: RefCell<VecDeque<Bytes>>,
    sink: RefCell<Option<Box<dyn FnMut(Bytes)>>>,
    completion: Cell<Completion>,
    on_success: RefCell<Vec<Task>>,
    on_failure: RefCell<Vec<Task>>,
}

/// Ordered, unbounded buffer of pending output plus an optional consumer.
///
/// Cheaply cloneable handle; all clones observe the same queue.
#[derive(Clone)]
pub struct BackpressureQueue {
    inner: Rc<Inner>,
}

impl BackpressureQueue {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(Inner {
                scheduler,
                pending: RefCell::new(VecDeque::new()),
                sink: RefCell::new(None),
                completion: Cell::new(Completion::Pending),
                on_success: RefCell::new(Vec::new()),
                on_failure: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Append items in order; always succeeds. A drain attempt is scheduled
    /// for the next tick.
    pub fn enqueue<I: IntoIterator<Item = Bytes>>(&self, items: I) {
        self.inner.pending.borrow_mut().extend(items);
        self.schedule_drain();
    }

    /// Register the one consumer function and schedule a drain attempt.
    pub fn attach_sink<F: FnMut(Bytes) + 'static>(&self, sink: F) {
        *self.inner.sink.borrow_mut() = Some(Box::new(sink));
        self.schedule_drain();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Current completion state.
    pub fn completion(&self) -> Completion {
        self.inner.completion.get()
    }

    /// Mark the queue complete.
    ///
    /// Without `flush`, or with nothing pending, completion succeeds
    /// immediately. Otherwise a drain is scheduled and the check repeats on
    /// every subsequent tick until the queue empties.
    pub fn finish(&self, flush: bool) {
        if self.inner.completion.get() != Completion::Pending {
            return;
        }
        if !flush || self.is_empty() {
            self.succeed();
            return;
        }
        self.schedule_drain();
        let queue = self.clone();
        self.inner.scheduler.next_tick(move || queue.finish(flush));
    }

    /// Mark the queue failed (transport-level error) and notify failure
    /// callbacks. One-shot; later calls are no-ops.
    pub fn fail(&self) {
        if self.inner.completion.get() != Completion::Pending {
            return;
        }
        self.inner.completion.set(Completion::Failed);
        // Resolution is one-shot: the other branch can never fire, and its
        // callbacks may hold the connection alive.
        self.inner.on_success.borrow_mut().clear();
        let callbacks = std::mem::take(&mut *self.inner.on_failure.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }

    /// Run `f` once the queue completes successfully. If completion has
    /// already succeeded, `f` runs immediately.
    pub fn on_success<F: FnOnce() + 'static>(&self, f: F) {
        match self.inner.completion.get() {
            Completion::Succeeded => f(),
            Completion::Failed => {}
            Completion::Pending => self.inner.on_success.borrow_mut().push(Box::new(f)),
        }
    }

    /// Run `f` if the queue is later marked failed. If it already failed,
    /// `f` runs immediately.
    pub fn on_failure<F: FnOnce() + 'static>(&self, f: F) {
        match self.inner.completion.get() {
            Completion::Failed => f(),
            Completion::Succeeded => {}
            Completion::Pending => self.inner.on_failure.borrow_mut().push(Box::new(f)),
        }
    }

    fn succeed(&self) {
        self.inner.completion.set(Completion::Succeeded);
        self.inner.on_failure.borrow_mut().clear();
        let callbacks = std::mem::take(&mut *self.inner.on_success.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }

    fn schedule_drain(&self) {
        if self.inner.sink.borrow().is_none() {
            // Items stay buffered until a sink shows up.
            return;
        }
        let queue = self.clone();
        self.inner.scheduler.next_tick(move || queue.drain_one());
    }

    fn drain_one(&self) {
        {
            let mut sink = self.inner.sink.borrow_mut();
            let Some(sink) = sink.as_mut() else { return };
            let Some(item) = self.inner.pending.borrow_mut().pop_front() else {
                return;
            };
            sink(item);
        }
        if !self.is_empty() {
            self.schedule_drain();
        }
    }
}

//! Cooperative scheduling seam.
//!
//! # Responsibilities
//! - Define the "run later" contract the engine suspends on ([`Scheduler`])
//! - Provide a deterministic single-threaded task queue ([`Reactor`])
//! - Provide a tokio-backed driver for async hosts ([`rt`])
//!
//! # Design Decisions
//! - Exactly one logical task runs at a time; "suspension" means pushing a
//!   continuation onto the queue, never blocking or spawning a thread.
//! - FIFO execution order is a correctness requirement: queue drains, the
//!   deferred startup sequence, and deferred close all rely on it.

pub mod rt;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// The "run later" capability the engine is built against.
///
/// Hosts provide an implementation; [`Reactor`] is the in-crate one.
pub trait Scheduler {
    /// Submit a task to run on a later tick, after all currently queued tasks.
    fn schedule(&self, task: Task);
}

impl dyn Scheduler {
    /// Closure-friendly form of [`Scheduler::schedule`].
    pub fn next_tick<F: FnOnce() + 'static>(&self, f: F) {
        self.schedule(Box::new(f));
    }
}

/// Deterministic single-threaded task queue.
///
/// Tasks run strictly in submission order; a task scheduled from within a
/// running task lands at the back of the queue.
#[derive(Default)]
pub struct Reactor {
    tasks: RefCell<VecDeque<Task>>,
}

impl Reactor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Run the next queued task. Returns false when the queue is empty.
    pub fn tick(&self) -> bool {
        // Pop before running so the task can schedule more work.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty.
    pub fn run(&self) {
        while self.tick() {}
    }

    /// Run at most `budget` tasks; returns how many ran.
    pub fn run_for(&self, budget: usize) -> usize {
        let mut ran = 0;
        while ran < budget && self.tick() {
            ran += 1;
        }
        ran
    }

    /// Number of tasks currently queued.
    pub fn depth(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl Scheduler for Reactor {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_tasks_in_submission_order() {
        let reactor = Reactor::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            reactor.schedule(Box::new(move || seen.borrow_mut().push(i)));
        }
        reactor.run();

        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn nested_schedule_runs_after_queued_tasks() {
        let reactor = Reactor::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            let inner_reactor = reactor.clone();
            reactor.schedule(Box::new(move || {
                seen.borrow_mut().push("first");
                let seen = seen.clone();
                inner_reactor.schedule(Box::new(move || seen.borrow_mut().push("nested")));
            }));
        }
        {
            let seen = seen.clone();
            reactor.schedule(Box::new(move || seen.borrow_mut().push("second")));
        }
        reactor.run();

        assert_eq!(*seen.borrow(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn run_for_respects_budget() {
        let reactor = Reactor::new();
        for _ in 0..5 {
            reactor.schedule(Box::new(|| {}));
        }
        assert_eq!(reactor.run_for(3), 3);
        assert_eq!(reactor.depth(), 2);
    }
}

//! Tokio-backed scheduler driver.
//!
//! Bridges the callback-driven engine into an async host: tasks are pumped
//! through an unbounded mpsc channel and executed, in FIFO order, by a
//! future the host awaits on a current-thread runtime. Tasks capture `Rc`
//! state and are not `Send`; drive [`TokioDriver::run`] with `block_on` or
//! inside a `LocalSet`, never via `tokio::spawn`.

use std::rc::Rc;

use tokio::sync::mpsc;

use super::{Scheduler, Task};

/// Scheduler handle backed by a tokio channel.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Task>,
}

/// Future side of the pair; executes submitted tasks in order.
pub struct TokioDriver {
    rx: mpsc::UnboundedReceiver<Task>,
}

/// Create a connected scheduler/driver pair.
pub fn pair() -> (Rc<TokioScheduler>, TokioDriver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Rc::new(TokioScheduler { tx }), TokioDriver { rx })
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        // The driver owning the receiver has shut down; dropping the task
        // matches what a stopped reactor does with queued work.
        let _ = self.tx.send(task);
    }
}

impl TokioDriver {
    /// Run tasks until every [`TokioScheduler`] handle has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
    }
}

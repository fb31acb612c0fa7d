//! Executor that runs nothing until told to.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use bcos_p2p_core::{Task, TaskExecutor};
use parking_lot::Mutex;

/// Queues scheduled tasks; the test drains them explicitly.
///
/// Makes "never inline" observable: after any session call returns, its
/// callbacks are sitting in [`Self::pending`] rather than having run.
#[derive(Default)]
pub struct ManualExecutor {
    tasks: Mutex<VecDeque<Task>>,
    executed: AtomicUsize,
}

impl ManualExecutor {
    /// Empty executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks scheduled and not yet run.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Tasks run so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Run the oldest task. Returns false if none was queued.
    pub fn run_next(&self) -> bool {
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                self.executed.fetch_add(1, Ordering::SeqCst);
                true
            },
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks scheduled by the
    /// tasks themselves. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drop every queued task without running it, as an executor shutting
    /// down would. Returns how many were dropped.
    pub fn discard_pending(&self) -> usize {
        let discarded: Vec<Task> = self.tasks.lock().drain(..).collect();
        discarded.len()
    }
}

impl TaskExecutor for ManualExecutor {
    fn schedule(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

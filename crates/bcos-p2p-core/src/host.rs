//! Host, timer, and executor boundary.
//!
//! A session holds only a weak reference to its [`Host`]: the host decides
//! whether the network subsystem is alive and hands out timers, but never
//! has its lifetime extended by a session. Callbacks are run by a
//! [`TaskExecutor`] that the session holds strongly, so a failure can always
//! be delivered even while the host is going away.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle};

/// Unit of work handed to an executor or fired by a timer.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs application callbacks off the I/O path.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Run `task` asynchronously, on any thread. Must never run it inline.
    fn schedule(&self, task: Task);
}

/// Handle to an armed one-shot timer.
pub trait Timer: Send + Sync {
    /// Stop the timer. A fire already in progress may still run; the fire
    /// callback must tolerate that.
    fn cancel(&self);
}

/// Node-level services a session consults.
pub trait Host: Send + Sync + 'static {
    /// Whether the network subsystem is up. Sessions refuse to start or send
    /// while this is false.
    fn is_network_alive(&self) -> bool;

    /// Arm a timer that runs `on_fire` once after `after`.
    fn new_timer(&self, after: Duration, on_fire: Task) -> Box<dyn Timer>;
}

/// Executor that runs each callback as a task on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Executor on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl TaskExecutor for TokioExecutor {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// Host backed by a Tokio runtime.
///
/// Timers are spawned `sleep` tasks; cancelling aborts the task.
#[derive(Debug)]
pub struct TokioHost {
    handle: Handle,
    network_alive: AtomicBool,
}

impl TokioHost {
    /// Host with the network marked alive.
    pub fn new(handle: Handle) -> Self {
        Self { handle, network_alive: AtomicBool::new(true) }
    }

    /// Mark the network subsystem up or down.
    pub fn set_network_alive(&self, alive: bool) {
        self.network_alive.store(alive, Ordering::Release);
    }

    /// Runtime used for timers.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Host for TokioHost {
    fn is_network_alive(&self) -> bool {
        self.network_alive.load(Ordering::Acquire)
    }

    fn new_timer(&self, after: Duration, on_fire: Task) -> Box<dyn Timer> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            on_fire();
        });
        Box::new(TokioTimer { abort: join.abort_handle() })
    }
}

struct TokioTimer {
    abort: AbortHandle,
}

impl Timer for TokioTimer {
    fn cancel(&self) {
        self.abort.abort();
    }
}

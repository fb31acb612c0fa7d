//! Host whose timers fire only when the test says so.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bcos_p2p_core::{Host, Task, Timer};
use parking_lot::Mutex;

/// One timer armed through [`ManualHost`].
pub struct ManualTimer {
    after: Duration,
    on_fire: Mutex<Option<Task>>,
    cancelled: AtomicBool,
}

impl ManualTimer {
    /// Duration the timer was armed with.
    pub fn after(&self) -> Duration {
        self.after
    }

    /// Whether the session cancelled it.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether it has fired.
    pub fn has_fired(&self) -> bool {
        self.on_fire.lock().is_none()
    }

    /// Fire unless cancelled or already fired. Returns whether it ran.
    pub fn fire(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.fire_stale()
    }

    /// Fire even if cancelled: models a completion that was already queued
    /// when `cancel` ran. Returns whether it ran.
    pub fn fire_stale(&self) -> bool {
        let task = self.on_fire.lock().take();
        match task {
            Some(task) => {
                task();
                true
            },
            None => false,
        }
    }
}

struct ManualTimerHandle(Arc<ManualTimer>);

impl Timer for ManualTimerHandle {
    fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Host with a switchable network flag and hand-fired timers.
pub struct ManualHost {
    network_alive: AtomicBool,
    timers: Mutex<Vec<Arc<ManualTimer>>>,
}

impl Default for ManualHost {
    fn default() -> Self {
        Self { network_alive: AtomicBool::new(true), timers: Mutex::new(Vec::new()) }
    }
}

impl ManualHost {
    /// Host with the network up and no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the network flag.
    pub fn set_network_alive(&self, alive: bool) {
        self.network_alive.store(alive, Ordering::SeqCst);
    }

    /// Timers armed so far, in arming order.
    pub fn timers(&self) -> Vec<Arc<ManualTimer>> {
        self.timers.lock().clone()
    }

    /// Timer armed `index`-th.
    pub fn timer(&self, index: usize) -> Option<Arc<ManualTimer>> {
        self.timers.lock().get(index).cloned()
    }

    /// Fire every live timer. Returns how many fired.
    pub fn fire_all(&self) -> usize {
        self.timers().iter().filter(|timer| timer.fire()).count()
    }
}

impl Host for ManualHost {
    fn is_network_alive(&self) -> bool {
        self.network_alive.load(Ordering::SeqCst)
    }

    fn new_timer(&self, after: Duration, on_fire: Task) -> Box<dyn Timer> {
        let timer = Arc::new(ManualTimer {
            after,
            on_fire: Mutex::new(Some(on_fire)),
            cancelled: AtomicBool::new(false),
        });
        self.timers.lock().push(timer.clone());
        Box::new(ManualTimerHandle(timer))
    }
}

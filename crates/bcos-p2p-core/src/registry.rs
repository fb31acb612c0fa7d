//! Pending calls keyed by sequence number.
//!
//! Every way a call can finish (response, timeout, teardown) goes through
//! [`ResponseRegistry::take`]: one lock acquisition that removes and returns
//! the entry. Whoever gets the entry owns the callback; everyone else sees the
//! sequence number as absent and does nothing. That is what makes delivery
//! exactly-once when a response and a timer race for the same call.
//!
//! Callbacks are never run under the lock, or inline at all: completion hands
//! them to the [`TaskExecutor`].

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    error::{DisconnectReason, SessionError},
    host::{TaskExecutor, Timer},
};

/// Callback receiving the outcome of one request.
pub type ResponseCallback<M> = Box<dyn FnOnce(Result<M, SessionError>) + Send + 'static>;

/// One outstanding request.
pub struct PendingCall<M> {
    callback: ResponseCallback<M>,
    timer: Option<Box<dyn Timer>>,
    timeout: Duration,
    created_at: Instant,
}

impl<M: Send + 'static> PendingCall<M> {
    /// Pending call with no timer attached yet.
    pub fn new(callback: ResponseCallback<M>, timeout: Duration) -> Self {
        Self { callback, timer: None, timeout, created_at: Instant::now() }
    }

    /// Timeout the call was registered with. Zero means none.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since registration.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether a timer is attached.
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel the timer, if any, and hand the callback to `executor`.
    pub fn complete(mut self, result: Result<M, SessionError>, executor: &dyn TaskExecutor) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        let callback = self.callback;
        executor.schedule(Box::new(move || callback(result)));
    }
}

struct RegistryState<M> {
    pending: HashMap<u32, PendingCall<M>>,
    closed: Option<DisconnectReason>,
}

/// Thread-safe map from sequence number to pending call.
pub struct ResponseRegistry<M> {
    state: Mutex<RegistryState<M>>,
    max_pending: usize,
}

impl<M: Send + 'static> ResponseRegistry<M> {
    /// Empty registry holding at most `max_pending` calls.
    pub fn new(max_pending: usize) -> Self {
        Self { state: Mutex::new(RegistryState { pending: HashMap::new(), closed: None }), max_pending }
    }

    /// Register `call` under `seq`.
    ///
    /// On failure the call is completed right away (through `executor`) with
    /// the returned error, so its callback still fires exactly once:
    /// - `DuplicateSequence` if `seq` is already pending
    /// - `TooManyPending` if the registry is full
    /// - `Disconnected` if the registry was already flushed
    pub fn register(
        &self,
        seq: u32,
        call: PendingCall<M>,
        executor: &dyn TaskExecutor,
    ) -> Result<(), SessionError> {
        let rejected = {
            let mut state = self.state.lock();
            if let Some(reason) = state.closed {
                Some((call, SessionError::Disconnected(reason)))
            } else if state.pending.contains_key(&seq) {
                Some((call, SessionError::DuplicateSequence(seq)))
            } else if state.pending.len() >= self.max_pending {
                Some((call, SessionError::TooManyPending { limit: self.max_pending }))
            } else {
                state.pending.insert(seq, call);
                debug!(seq, pending = state.pending.len(), "registered pending call");
                None
            }
        };

        match rejected {
            None => Ok(()),
            Some((call, error)) => {
                warn!(seq, %error, "refusing pending call");
                call.complete(Err(error.clone()), executor);
                Err(error)
            },
        }
    }

    /// Attach a timer to the call under `seq`.
    ///
    /// When the call already finished, the timer is cancelled and `false`
    /// returned.
    pub fn attach_timer(&self, seq: u32, timer: Box<dyn Timer>) -> bool {
        let orphan = {
            let mut state = self.state.lock();
            match state.pending.get_mut(&seq) {
                Some(call) => {
                    call.timer = Some(timer);
                    None
                },
                None => Some(timer),
            }
        };

        match orphan {
            None => true,
            Some(timer) => {
                trace!(seq, "call settled before its timer was attached");
                timer.cancel();
                false
            },
        }
    }

    /// Remove and return the call under `seq`.
    ///
    /// This is the only removal point; whoever receives `Some` owns the call.
    pub fn take(&self, seq: u32) -> Option<PendingCall<M>> {
        self.state.lock().pending.remove(&seq)
    }

    /// Complete the call under `seq` with `message`.
    ///
    /// Gives the message back when no call is pending (already timed out,
    /// already flushed, or never registered).
    pub fn resolve(&self, seq: u32, message: M, executor: &dyn TaskExecutor) -> Result<(), M> {
        match self.take(seq) {
            Some(call) => {
                debug!(seq, rtt = ?call.elapsed(), "resolved pending call");
                call.complete(Ok(message), executor);
                Ok(())
            },
            None => Err(message),
        }
    }

    /// Fail the call under `seq` with a timeout. No-op when already settled.
    pub fn expire(&self, seq: u32, executor: &dyn TaskExecutor) -> bool {
        match self.take(seq) {
            Some(call) => {
                let after = call.timeout();
                warn!(seq, ?after, "pending call timed out");
                call.complete(Err(SessionError::Timeout { seq, after }), executor);
                true
            },
            None => {
                trace!(seq, "timer fired for settled call");
                false
            },
        }
    }

    /// Fail every pending call with `Disconnected(reason)` and refuse new
    /// registrations. Returns the number of calls failed.
    pub fn flush(&self, reason: DisconnectReason, executor: &dyn TaskExecutor) -> usize {
        let drained: Vec<(u32, PendingCall<M>)> = {
            let mut state = self.state.lock();
            state.closed = Some(reason);
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (seq, call) in drained {
            trace!(seq, %reason, "failing pending call on teardown");
            call.complete(Err(SessionError::Disconnected(reason)), executor);
        }
        count
    }

    /// Whether `seq` is pending.
    pub fn contains(&self, seq: u32) -> bool {
        self.state.lock().pending.contains_key(&seq)
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no call is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use proptest::prelude::*;

    use super::*;
    use crate::host::Task;

    /// Queues tasks until the test runs them.
    #[derive(Default)]
    struct QueueExecutor {
        tasks: Mutex<Vec<Task>>,
    }

    impl QueueExecutor {
        fn run_all(&self) -> usize {
            let tasks = std::mem::take(&mut *self.tasks.lock());
            let count = tasks.len();
            for task in tasks {
                task();
            }
            count
        }
    }

    impl TaskExecutor for QueueExecutor {
        fn schedule(&self, task: Task) {
            self.tasks.lock().push(task);
        }
    }

    #[derive(Default)]
    struct FlagTimer {
        cancelled: Arc<AtomicBool>,
    }

    impl Timer for FlagTimer {
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    type Outcomes = Arc<Mutex<Vec<(u32, Result<&'static str, SessionError>)>>>;

    fn recording_call(seq: u32, outcomes: &Outcomes) -> PendingCall<&'static str> {
        let outcomes = outcomes.clone();
        PendingCall::new(
            Box::new(move |result| outcomes.lock().push((seq, result))),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn resolve_delivers_once_and_cancels_timer() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(16);
        let outcomes = Outcomes::default();
        let cancelled = Arc::new(AtomicBool::new(false));

        registry.register(7, recording_call(7, &outcomes), &executor).unwrap();
        assert!(registry.attach_timer(7, Box::new(FlagTimer { cancelled: cancelled.clone() })));

        assert!(registry.resolve(7, "pong", &executor).is_ok());
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!registry.contains(7));

        // Callback has not run yet: completion only schedules it.
        assert!(outcomes.lock().is_empty());
        executor.run_all();

        // Stale timer fire after resolution is a no-op.
        assert!(!registry.expire(7, &executor));
        assert_eq!(executor.run_all(), 0);

        assert_eq!(*outcomes.lock(), vec![(7, Ok("pong"))]);
    }

    #[test]
    fn expire_then_late_response_is_ignored() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(16);
        let outcomes = Outcomes::default();

        registry.register(3, recording_call(3, &outcomes), &executor).unwrap();
        assert!(registry.expire(3, &executor));
        assert_eq!(registry.resolve(3, "late", &executor), Err("late"));
        executor.run_all();

        let outcomes = outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], (3, Err(SessionError::Timeout { seq: 3, .. }))));
    }

    #[test]
    fn duplicate_sequence_is_rejected_without_disturbing_original() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(16);
        let outcomes = Outcomes::default();

        registry.register(1, recording_call(1, &outcomes), &executor).unwrap();
        let err = registry.register(1, recording_call(1, &outcomes), &executor).unwrap_err();
        assert_eq!(err, SessionError::DuplicateSequence(1));
        assert_eq!(registry.len(), 1);

        executor.run_all();
        assert_eq!(*outcomes.lock(), vec![(1, Err(SessionError::DuplicateSequence(1)))]);
    }

    #[test]
    fn full_registry_refuses_new_calls() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(2);
        let outcomes = Outcomes::default();

        registry.register(1, recording_call(1, &outcomes), &executor).unwrap();
        registry.register(2, recording_call(2, &outcomes), &executor).unwrap();
        let err = registry.register(3, recording_call(3, &outcomes), &executor).unwrap_err();

        assert_eq!(err, SessionError::TooManyPending { limit: 2 });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn flush_fails_everything_and_closes_registry() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(16);
        let outcomes = Outcomes::default();
        let cancelled = Arc::new(AtomicBool::new(false));

        for seq in 0..3 {
            registry.register(seq, recording_call(seq, &outcomes), &executor).unwrap();
        }
        registry.attach_timer(1, Box::new(FlagTimer { cancelled: cancelled.clone() }));

        assert_eq!(registry.flush(DisconnectReason::DuplicatePeer, &executor), 3);
        assert!(registry.is_empty());
        assert!(cancelled.load(Ordering::SeqCst));

        let err = registry.register(9, recording_call(9, &outcomes), &executor).unwrap_err();
        assert_eq!(err, SessionError::Disconnected(DisconnectReason::DuplicatePeer));

        executor.run_all();
        let mut outcomes = outcomes.lock().clone();
        outcomes.sort_by_key(|(seq, _)| *seq);
        let expected = SessionError::Disconnected(DisconnectReason::DuplicatePeer);
        assert_eq!(
            outcomes,
            vec![
                (0, Err(expected.clone())),
                (1, Err(expected.clone())),
                (2, Err(expected.clone())),
                (9, Err(expected)),
            ]
        );
    }

    #[test]
    fn timer_attached_after_settlement_is_cancelled() {
        let executor = QueueExecutor::default();
        let registry = ResponseRegistry::new(16);
        let outcomes = Outcomes::default();
        let cancelled = Arc::new(AtomicBool::new(false));

        registry.register(5, recording_call(5, &outcomes), &executor).unwrap();
        registry.resolve(5, "fast", &executor).unwrap();

        assert!(!registry.attach_timer(5, Box::new(FlagTimer { cancelled: cancelled.clone() })));
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[derive(Debug, Clone, Copy)]
    enum Event {
        Respond(u32),
        Expire(u32),
        Flush,
    }

    fn event_strategy() -> impl Strategy<Value = Event> {
        prop_oneof![
            4 => (0..8u32).prop_map(Event::Respond),
            4 => (0..8u32).prop_map(Event::Expire),
            1 => Just(Event::Flush),
        ]
    }

    proptest! {
        /// Every registered call completes exactly once, whatever order
        /// responses, timer fires, and teardown arrive in.
        #[test]
        fn prop_exactly_once_under_any_interleaving(
            events in prop::collection::vec(event_strategy(), 0..40),
            run_between in any::<bool>(),
        ) {
            let executor = QueueExecutor::default();
            let registry = ResponseRegistry::new(64);
            let outcomes = Outcomes::default();

            for seq in 0..8 {
                registry.register(seq, recording_call(seq, &outcomes), &executor).unwrap();
            }

            for event in events {
                match event {
                    Event::Respond(seq) => {
                        let _ = registry.resolve(seq, "ok", &executor);
                    },
                    Event::Expire(seq) => {
                        registry.expire(seq, &executor);
                    },
                    Event::Flush => {
                        registry.flush(DisconnectReason::TransportError, &executor);
                    },
                }
                if run_between {
                    executor.run_all();
                }
            }
            registry.flush(DisconnectReason::Requested, &executor);
            executor.run_all();

            let outcomes = outcomes.lock();
            prop_assert_eq!(outcomes.len(), 8);
            let mut seen: Vec<u32> = outcomes.iter().map(|(seq, _)| *seq).collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..8).collect::<Vec<_>>());
            prop_assert!(registry.is_empty());
        }
    }
}

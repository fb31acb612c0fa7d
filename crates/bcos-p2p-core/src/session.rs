//! Session state machine for one peer connection.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  start()  ┌────────┐  drop(reason)  ┌──────────┐        ┌────────┐
//! │ Idle │──────────>│ Active │───────────────>│ Draining │───────>│ Closed │
//! └──────┘           └────────┘                └──────────┘        └────────┘
//! ```
//!
//! `start()` is the only way into `Active` and only succeeds while the host
//! reports the network alive. Teardown is a single compare-and-swap out of
//! `Active`: the caller that wins it flushes the registry, notifies the
//! handler and closes the socket; every other caller (a second `disconnect`,
//! a racing read error, a failed write) is a no-op. There is no way back from
//! `Closed`; a new connection gets a new session.
//!
//! # Tasks
//!
//! The read loop runs as one task for the lifetime of the session. The write
//! pump runs as a task only while frames are queued; the queue's in-flight
//! flag guarantees at most one such task per session.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use bcos_p2p_proto::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::{
    codec::{Decoded, FrameCodec},
    config::{CallOptions, SessionConfig},
    error::{DisconnectReason, SessionError},
    host::{Host, TaskExecutor},
    registry::{PendingCall, ResponseRegistry},
    socket::SessionSocket,
    write_queue::{QueuedWrite, WriteQueue},
};

/// Handler for unsolicited frames, requests, protocol errors, and the final
/// disconnect notification.
pub type MessageHandler<C> = Arc<
    dyn Fn(Arc<Session<C>>, Result<<C as FrameCodec>::Message, SessionError>) + Send + Sync,
>;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Created, not reading yet
    Idle = 0,
    /// Reading and accepting sends
    Active = 1,
    /// Teardown in progress
    Draining = 2,
    /// Torn down
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Whether the read loop should arm another read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// Buffer drained of complete frames; read again.
    NeedMore,
    /// Framing failed; the stream is unusable and no further read is armed.
    Halted,
}

/// One peer connection.
///
/// Always handled through `Arc<Session>`; see [`crate::SessionFactory`].
pub struct Session<C: FrameCodec> {
    state: AtomicU8,
    host: Weak<dyn Host>,
    socket: Arc<dyn SessionSocket>,
    codec: Arc<C>,
    executor: Arc<dyn TaskExecutor>,
    reactor: Handle,
    config: SessionConfig,
    registry: ResponseRegistry<C::Message>,
    write_queue: WriteQueue,
    inbound: Mutex<BytesMut>,
    handler: RwLock<Option<MessageHandler<C>>>,
    this: Weak<Self>,
}

impl<C: FrameCodec> Session<C> {
    pub(crate) fn new(
        host: Weak<dyn Host>,
        socket: Arc<dyn SessionSocket>,
        codec: Arc<C>,
        executor: Arc<dyn TaskExecutor>,
        reactor: Handle,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            host,
            socket,
            codec,
            executor,
            reactor,
            registry: ResponseRegistry::new(config.max_pending_calls),
            write_queue: WriteQueue::new(),
            inbound: Mutex::new(BytesMut::with_capacity(config.read_buffer_len)),
            handler: RwLock::new(None),
            config,
            this: this.clone(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Active, and the host is still around with its network up.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
            && self.host.upgrade().is_some_and(|host| host.is_network_alive())
    }

    /// Peer address, when the socket knows it.
    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.socket.remote_endpoint()
    }

    /// Calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.registry.len()
    }

    /// Frames waiting to be written.
    pub fn queued_writes(&self) -> usize {
        self.write_queue.len()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Install the handler for requests, unmatched frames, protocol errors,
    /// and the disconnect notification. Replaces any previous handler.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(Arc<Self>, Result<C::Message, SessionError>) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Move from `Idle` to `Active` and arm the first read.
    ///
    /// Must be called from within the session's Tokio runtime or with its
    /// handle reachable (the read loop is spawned onto it).
    ///
    /// # Errors
    ///
    /// - `Inactive` if the host is gone or its network is down; the session
    ///   stays `Idle` and may be started later.
    /// - `InvalidState` if the session was already started or torn down.
    pub fn start(&self) -> Result<(), SessionError> {
        if !self.host.upgrade().is_some_and(|host| host.is_network_alive()) {
            warn!(remote = ?self.remote_endpoint(), "network down, session not started");
            return Err(SessionError::Inactive);
        }

        if let Err(actual) = self.state.compare_exchange(
            SessionState::Idle as u8,
            SessionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(SessionError::InvalidState {
                state: SessionState::from_u8(actual),
                operation: "start",
            });
        }

        let Some(this) = self.this.upgrade() else {
            return Err(SessionError::Inactive);
        };
        info!(remote = ?self.remote_endpoint(), "session started");
        self.reactor.spawn(this.read_loop());
        Ok(())
    }

    /// Send a request and get its outcome through `callback`.
    ///
    /// The callback runs on the executor, never inline, exactly once: with
    /// the correlated response, or with `Inactive`, `Timeout`,
    /// `Disconnected`, `DuplicateSequence`, `TooManyPending` or an encode
    /// failure. A zero `options.timeout` arms no timer.
    pub fn send<F>(&self, message: C::Message, options: CallOptions, callback: F)
    where
        F: FnOnce(Result<C::Message, SessionError>) + Send + 'static,
    {
        let seq = self.codec.sequence(&message);

        if !self.is_active() {
            warn!(seq, remote = ?self.remote_endpoint(), "send on inactive session");
            self.executor.schedule(Box::new(move || callback(Err(SessionError::Inactive))));
            return;
        }

        let buffer = match self.codec.encode(&message) {
            Ok(buffer) => buffer,
            Err(error) => {
                warn!(seq, %error, "failed to encode outbound frame");
                self.executor.schedule(Box::new(move || callback(Err(SessionError::Protocol(error)))));
                return;
            },
        };

        let call = PendingCall::new(Box::new(callback), options.timeout);
        if self.registry.register(seq, call, self.executor.as_ref()).is_err() {
            return;
        }
        if !options.timeout.is_zero() {
            self.arm_timer(seq, options.timeout);
        }

        self.enqueue(seq, buffer);
    }

    /// Send a frame that expects no response (a response to a peer request,
    /// a notification).
    ///
    /// # Errors
    ///
    /// `Inactive` if the session is not active, `Protocol` if encoding fails.
    pub fn send_oneway(&self, message: &C::Message) -> Result<(), SessionError> {
        let seq = self.codec.sequence(message);
        if !self.is_active() {
            return Err(SessionError::Inactive);
        }
        let buffer = self.codec.encode(message)?;
        self.enqueue(seq, buffer);
        Ok(())
    }

    /// Send a request and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Whatever [`Self::send`] would hand its callback. If the executor drops
    /// the completion task without running it, `Disconnected(Requested)`.
    pub async fn request(
        &self,
        message: C::Message,
        options: CallOptions,
    ) -> Result<C::Message, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(message, options, move |result| {
            let _ = tx.send(result);
        });
        // The sender only vanishes if the executor dropped the task unrun; the
        // call was abandoned locally, so it reads as a requested teardown.
        rx.await.unwrap_or(Err(SessionError::Disconnected(DisconnectReason::Requested)))
    }

    /// Tear the session down. Same path as an I/O-triggered teardown; calling
    /// it again, or racing it with an I/O error, is a no-op.
    pub fn disconnect(&self, reason: DisconnectReason) {
        info!(%reason, remote = ?self.remote_endpoint(), "disconnecting");
        self.drop_connection(reason);
    }

    /// Feed bytes from a completed read into the frame loop.
    ///
    /// Decodes and dispatches every complete frame. A trailing partial frame
    /// stays buffered for the next read. On a framing error the handler of an
    /// active session receives `Protocol(..)` and the caller must not read
    /// again; dropping the session is left to the handler.
    pub fn on_read_complete(&self, bytes: &[u8]) -> ReadProgress {
        let mut frames = Vec::new();
        let mut failure = None;
        {
            let mut inbound = self.inbound.lock();
            inbound.extend_from_slice(bytes);

            while !inbound.is_empty() {
                match self.codec.decode(&inbound[..]) {
                    Decoded::Frame { consumed, message } => {
                        if consumed == 0 || consumed > inbound.len() {
                            failure = Some(ProtocolError::InvalidConsumption {
                                consumed,
                                available: inbound.len(),
                            });
                            break;
                        }
                        inbound.advance(consumed);
                        frames.push(message);
                    },
                    Decoded::NeedMore => break,
                    Decoded::Error(error) => {
                        failure = Some(error);
                        break;
                    },
                }
            }
        }

        trace!(bytes = bytes.len(), frames = frames.len(), "read complete");
        for message in frames {
            self.dispatch(message);
        }

        match failure {
            None => ReadProgress::NeedMore,
            Some(error) => {
                error!(%error, remote = ?self.remote_endpoint(), "failed to decode inbound frame");
                if self.is_active() {
                    self.notify_handler(Err(SessionError::Protocol(error)));
                }
                ReadProgress::Halted
            },
        }
    }

    fn dispatch(&self, message: C::Message) {
        if !self.is_active() {
            trace!("dropping inbound frame on inactive session");
            return;
        }

        let seq = self.codec.sequence(&message);
        let message = if self.codec.is_request(&message) {
            message
        } else {
            match self.registry.resolve(seq, message, self.executor.as_ref()) {
                Ok(()) => return,
                Err(unmatched) => unmatched,
            }
        };

        trace!(seq, "no pending call, routing to message handler");
        self.notify_handler(Ok(message));
    }

    fn notify_handler(&self, event: Result<C::Message, SessionError>) {
        let handler = self.handler.read().clone();
        let (Some(handler), Some(this)) = (handler, self.this.upgrade()) else {
            warn!(remote = ?self.remote_endpoint(), "no message handler installed");
            return;
        };
        self.executor.schedule(Box::new(move || handler(this, event)));
    }

    fn arm_timer(&self, seq: u32, after: Duration) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let session = self.this.clone();
        let timer = host.new_timer(
            after,
            Box::new(move || {
                if let Some(session) = session.upgrade() {
                    session.registry.expire(seq, session.executor.as_ref());
                }
            }),
        );
        self.registry.attach_timer(seq, timer);
    }

    fn enqueue(&self, seq: u32, buffer: Bytes) {
        if !self.socket.is_connected() {
            warn!(seq, remote = ?self.remote_endpoint(), "socket closed, dropping session");
            self.drop_connection(DisconnectReason::TransportError);
            return;
        }

        let queued = self.write_queue.push(buffer);
        trace!(seq, queued, "frame queued");
        self.pump();
    }

    fn pump(&self) {
        let Some(entry) = self.write_queue.begin_write() else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        self.reactor.spawn(this.write_loop(entry));
    }

    async fn write_loop(self: Arc<Self>, mut entry: QueuedWrite) {
        loop {
            if self.state() != SessionState::Active {
                return;
            }
            if !self.is_active() {
                warn!(remote = ?self.remote_endpoint(), "host gone or network down, dropping session");
                self.drop_connection(DisconnectReason::TransportError);
                return;
            }

            let len = entry.buffer.len();
            trace!(bytes = len, waited = ?entry.enqueued_at.elapsed(), "writing frame");
            if let Err(error) = self.socket.write_all(&entry.buffer).await {
                warn!(%error, remote = ?self.remote_endpoint(), "write failed");
                self.drop_connection(DisconnectReason::TransportError);
                return;
            }
            trace!(bytes = len, "frame written");

            match self.write_queue.complete_write() {
                Some(next) => entry = next,
                None => return,
            }
        }
    }

    async fn read_loop(self: Arc<Self>) {
        let mut chunk = vec![0u8; self.config.read_buffer_len.max(1)];
        loop {
            if self.state() != SessionState::Active {
                debug!("session inactive, read loop exiting");
                return;
            }
            if !self.is_active() {
                warn!(remote = ?self.remote_endpoint(), "host gone or network down, dropping session");
                self.drop_connection(DisconnectReason::TransportError);
                return;
            }
            if !self.socket.is_connected() {
                warn!(remote = ?self.remote_endpoint(), "socket closed before read");
                self.drop_connection(DisconnectReason::TransportError);
                return;
            }

            match self.socket.read(&mut chunk).await {
                Ok(0) => {
                    info!(remote = ?self.remote_endpoint(), "peer closed connection");
                    self.drop_connection(DisconnectReason::TransportError);
                    return;
                },
                Ok(n) => {
                    if self.on_read_complete(&chunk[..n]) == ReadProgress::Halted {
                        return;
                    }
                },
                Err(error) => {
                    if self.state() == SessionState::Active {
                        warn!(%error, remote = ?self.remote_endpoint(), "read failed");
                    }
                    self.drop_connection(DisconnectReason::TransportError);
                    return;
                },
            }
        }
    }

    /// The single teardown path.
    fn drop_connection(&self, reason: DisconnectReason) {
        if self
            .state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let failed = self.registry.flush(reason, self.executor.as_ref());
        let discarded = self.write_queue.clear();
        info!(
            %reason,
            failed,
            discarded,
            remote = ?self.remote_endpoint(),
            "session dropped"
        );

        self.notify_handler(Err(SessionError::Disconnected(reason)));

        if let Err(error) = self.socket.close() {
            debug!(%error, "ignoring socket close failure");
        }
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}

impl<C: FrameCodec> Drop for Session<C> {
    fn drop(&mut self) {
        // Released without a teardown (e.g. reads halted on a framing error and
        // nobody disconnected): pending callbacks must still fire once.
        let failed = self.registry.flush(DisconnectReason::Requested, self.executor.as_ref());
        if failed > 0 {
            warn!(failed, remote = ?self.remote_endpoint(), "session released with pending calls");
        }
        self.write_queue.clear();

        if self.socket.is_connected() {
            let _ = self.socket.close();
        }
    }
}

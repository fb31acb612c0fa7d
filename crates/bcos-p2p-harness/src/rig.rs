//! A session wired to the manual doubles.

use std::{net::SocketAddr, sync::Arc};

use bcos_p2p_core::{
    P2pCodec, Session, SessionConfig, SessionError, SessionFactory, SessionSocket, TaskExecutor,
};
use bcos_p2p_proto::P2pMessage;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::{ManualExecutor, ManualHost, ScriptedSocket};

/// Everything the message handler received, in delivery order.
pub type HandlerEvents = Arc<Mutex<Vec<Result<P2pMessage, SessionError>>>>;

/// Session over a [`ScriptedSocket`] with a [`ManualHost`] and
/// [`ManualExecutor`].
///
/// The read loop and write pump still run as real tasks on the current
/// Tokio runtime; callbacks and timers only run when the test drives them.
pub struct Rig {
    /// Host with hand-fired timers
    pub host: Arc<ManualHost>,
    /// Executor the test drains
    pub executor: Arc<ManualExecutor>,
    /// Socket the test feeds
    pub socket: Arc<ScriptedSocket>,
    /// Session under test, still `Idle`
    pub session: Arc<Session<P2pCodec>>,
}

impl Rig {
    /// Idle session with default configuration.
    ///
    /// # Panics
    ///
    /// Outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Idle session with `config`.
    ///
    /// # Panics
    ///
    /// Outside a Tokio runtime.
    pub fn with_config(config: SessionConfig) -> Self {
        let host = Arc::new(ManualHost::new());
        let executor = Arc::new(ManualExecutor::new());
        let remote: SocketAddr = SocketAddr::from(([127, 0, 0, 1], 30300));
        let socket = Arc::new(ScriptedSocket::new(Some(remote)));

        let shared: Arc<dyn TaskExecutor> = executor.clone();
        let factory = SessionFactory::new(&host, shared, P2pCodec::default(), Handle::current())
            .with_config(config);
        let session_socket: Arc<dyn SessionSocket> = socket.clone();
        let session = factory.create_session(session_socket);

        Self { host, executor, socket, session }
    }

    /// Install a handler that records every event.
    pub fn record_handler(&self) -> HandlerEvents {
        let events: HandlerEvents = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        self.session.set_message_handler(move |_, event| sink.lock().push(event));
        events
    }

    /// Start the session.
    ///
    /// # Panics
    ///
    /// If the session refuses to start.
    #[allow(clippy::expect_used)]
    pub fn started(self) -> Self {
        self.session.start().expect("session should start");
        self
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

/// Let spawned read and write tasks make progress.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

//! Builds sessions from resources shared across a node.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;

use crate::{
    codec::FrameCodec,
    config::SessionConfig,
    host::{Host, TaskExecutor},
    session::Session,
    socket::SessionSocket,
};

/// Everything a session needs besides its socket.
///
/// The host is held weakly, so a factory (and every session it creates)
/// never keeps the host alive.
pub struct SessionFactory<C: FrameCodec> {
    host: Weak<dyn Host>,
    executor: Arc<dyn TaskExecutor>,
    codec: Arc<C>,
    reactor: Handle,
    config: SessionConfig,
}

impl<C: FrameCodec> SessionFactory<C> {
    /// Factory with the default [`SessionConfig`].
    ///
    /// `reactor` runs the read loop and write pump of every session.
    pub fn new<H: Host>(
        host: &Arc<H>,
        executor: Arc<dyn TaskExecutor>,
        codec: C,
        reactor: Handle,
    ) -> Self {
        let host: Weak<H> = Arc::downgrade(host);
        let host: Weak<dyn Host> = host;
        Self { host, executor, codec: Arc::new(codec), reactor, config: SessionConfig::default() }
    }

    /// Replace the session configuration.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration applied to new sessions.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Create an idle session owning `socket`.
    pub fn create_session(&self, socket: Arc<dyn SessionSocket>) -> Arc<Session<C>> {
        Session::new(
            self.host.clone(),
            socket,
            self.codec.clone(),
            self.executor.clone(),
            self.reactor.clone(),
            self.config.clone(),
        )
    }
}

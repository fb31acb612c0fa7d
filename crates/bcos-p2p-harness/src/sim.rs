//! Sessions over turmoil's simulated TCP.
//!
//! Inside a turmoil host every timer and sleep runs on virtual time, so
//! timeout tests complete instantly and deterministically.

use std::{io, sync::Arc};

use bcos_p2p_core::{
    P2pCodec, Session, SessionConfig, SessionFactory, StreamSocket, TaskExecutor, TokioExecutor,
    TokioHost,
};
use tokio::runtime::Handle;
use tracing::debug;
use turmoil::net::{TcpListener, TcpStream};

/// One simulated node: the production Tokio host and executor, bound to the
/// turmoil host's runtime.
pub struct SimNode {
    /// Host whose network flag the test may flip
    pub host: Arc<TokioHost>,
    factory: SessionFactory<P2pCodec>,
}

impl SimNode {
    /// Node with default session configuration.
    ///
    /// # Panics
    ///
    /// Outside a turmoil host (or any Tokio runtime).
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Node with `config` applied to every session.
    ///
    /// # Panics
    ///
    /// Outside a turmoil host (or any Tokio runtime).
    pub fn with_config(config: SessionConfig) -> Self {
        let handle = Handle::current();
        let host = Arc::new(TokioHost::new(handle.clone()));
        let executor: Arc<dyn TaskExecutor> = Arc::new(TokioExecutor::new(handle.clone()));
        let factory =
            SessionFactory::new(&host, executor, P2pCodec::default(), handle).with_config(config);
        Self { host, factory }
    }

    /// Wrap an established stream in an idle session.
    pub fn session(&self, stream: TcpStream) -> Arc<Session<P2pCodec>> {
        let remote = stream.peer_addr().ok();
        self.factory.create_session(Arc::new(StreamSocket::new(stream, remote)))
    }

    /// Dial `addr` and wrap the connection in an idle session.
    pub async fn connect(&self, addr: &str) -> io::Result<Arc<Session<P2pCodec>>> {
        let stream = TcpStream::connect(addr).await?;
        debug!(addr, "dialled");
        Ok(self.session(stream))
    }

    /// Accept one connection and wrap it in an idle session.
    pub async fn accept(&self, listener: &TcpListener) -> io::Result<Arc<Session<P2pCodec>>> {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted");
        Ok(self.session(stream))
    }
}

impl Default for SimNode {
    fn default() -> Self {
        Self::new()
    }
}

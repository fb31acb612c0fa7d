//! TCP node: one session per connection.

use std::{net::SocketAddr, sync::Arc};

use bcos_p2p_core::{
    DisconnectReason, P2pCodec, Session, SessionConfig, SessionFactory, StreamSocket,
    TaskExecutor, TokioExecutor, TokioHost,
};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime::Handle,
};
use tracing::{info, warn};

use crate::{
    dial::{DialOptions, DialReport, run_probes},
    echo::install_echo,
    error::NodeError,
};

/// Host, executor, and session factory shared by every connection.
pub struct Node {
    // Sessions hold the host weakly
    _host: Arc<TokioHost>,
    factory: SessionFactory<P2pCodec>,
}

impl Node {
    /// Node bound to `handle`.
    pub fn new(handle: Handle, codec: P2pCodec, config: SessionConfig) -> Self {
        let host = Arc::new(TokioHost::new(handle.clone()));
        let executor: Arc<dyn TaskExecutor> = Arc::new(TokioExecutor::new(handle.clone()));
        let factory = SessionFactory::new(&host, executor, codec, handle).with_config(config);
        Self { _host: host, factory }
    }

    /// Wrap a connected stream in an idle session.
    pub fn session(&self, stream: TcpStream) -> Arc<Session<P2pCodec>> {
        let remote = stream.peer_addr().ok();
        if let Err(error) = stream.set_nodelay(true) {
            warn!(%error, "failed to disable Nagle");
        }
        self.factory.create_session(Arc::new(StreamSocket::new(stream, remote)))
    }

    /// Accept connections on `addr` forever, echoing requests on each.
    pub async fn listen(&self, addr: SocketAddr) -> Result<(), NodeError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), NodeError> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let session = self.session(stream);
            install_echo(&session);
            match session.start() {
                Ok(()) => info!(%peer, "peer connected"),
                Err(error) => warn!(%peer, %error, "refusing peer"),
            }
        }
    }

    /// Connect to `addr`, run the probes, and disconnect.
    pub async fn dial(&self, addr: SocketAddr, options: DialOptions) -> Result<DialReport, NodeError> {
        let stream = TcpStream::connect(addr).await?;
        let session = self.session(stream);
        install_echo(&session);
        session.start()?;
        info!(%addr, count = options.count, "dialled peer");

        let report = run_probes(&session, options).await;
        session.disconnect(DisconnectReason::ClientQuit);

        if report.sent > 0 && report.succeeded() == 0 {
            return Err(NodeError::NoResponses { sent: report.sent });
        }
        Ok(report)
    }
}

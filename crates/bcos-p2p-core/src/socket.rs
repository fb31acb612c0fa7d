//! Socket boundary.
//!
//! The session needs one outstanding read and one outstanding write at a
//! time, concurrently, plus a synchronous best-effort close that unblocks
//! both.

use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex, watch},
};

/// Asynchronous byte stream owned by one session.
#[async_trait]
pub trait SessionSocket: Send + Sync + 'static {
    /// False once the socket has been closed.
    fn is_connected(&self) -> bool;

    /// Read some bytes. `Ok(0)` means the peer closed the stream.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer.
    async fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Close the socket, aborting any pending read or write.
    fn close(&self) -> io::Result<()>;

    /// Peer address, when known.
    fn remote_endpoint(&self) -> Option<SocketAddr>;
}

/// [`SessionSocket`] over any Tokio stream (TCP, TLS, simulated).
///
/// The stream is split so a read and a write can be pending at the same time.
/// `close()` flips a watch flag that aborts whichever halves are busy; the
/// halves are released as soon as nothing holds them, which drops the stream.
pub struct StreamSocket<S> {
    reader: Mutex<Option<ReadHalf<S>>>,
    writer: Mutex<Option<WriteHalf<S>>>,
    closed: watch::Sender<bool>,
    remote: Option<SocketAddr>,
}

impl<S> StreamSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, remote: Option<SocketAddr>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed,
            remote,
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "socket closed")
}

#[async_trait]
impl<S> SessionSocket for StreamSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut closed = self.closed.subscribe();
        let mut reader = self.reader.lock().await;
        let Some(half) = reader.as_mut() else {
            return Err(closed_error());
        };

        let outcome = tokio::select! {
            result = half.read(buf) => Some(result),
            _ = closed.wait_for(|closed| *closed) => None,
        };

        match outcome {
            Some(result) => result,
            None => {
                reader.take();
                Err(closed_error())
            },
        }
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut closed = self.closed.subscribe();
        let mut writer = self.writer.lock().await;
        let Some(half) = writer.as_mut() else {
            return Err(closed_error());
        };

        let outcome = tokio::select! {
            result = half.write_all(buf) => Some(result),
            _ = closed.wait_for(|closed| *closed) => None,
        };

        match outcome {
            Some(Ok(())) => half.flush().await,
            Some(Err(error)) => Err(error),
            None => {
                writer.take();
                Err(closed_error())
            },
        }
    }

    fn close(&self) -> io::Result<()> {
        let was_closed = self.closed.send_replace(true);

        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }

        if was_closed {
            return Err(io::Error::new(ErrorKind::NotConnected, "socket already closed"));
        }
        Ok(())
    }

    fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.remote
    }
}

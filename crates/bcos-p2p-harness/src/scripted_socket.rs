//! Socket whose reads are fed by the test and whose writes are recorded.

use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bcos_p2p_core::SessionSocket;
use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::{Mutex, Semaphore, mpsc, watch};

struct Inbound {
    rx: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    leftover: BytesMut,
}

/// In-memory [`SessionSocket`] driven by the test.
///
/// - Reads return whatever [`Self::feed`] queued, split to fit the caller's
///   buffer; an empty feed reads as end of stream.
/// - Writes are recorded whole, in order. [`Self::hold_writes`] parks every
///   write until [`Self::release_writes`] lets it through, which keeps a
///   write in flight for as long as the test needs.
/// - [`Self::fail_write_at`] makes one write attempt fail.
pub struct ScriptedSocket {
    inbound_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
    inbound: Mutex<Inbound>,
    written: watch::Sender<Vec<Bytes>>,
    attempts: AtomicUsize,
    fail_at: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
    closed: watch::Sender<bool>,
    close_calls: AtomicUsize,
    remote: Option<SocketAddr>,
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "scripted socket closed")
}

impl Default for ScriptedSocket {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ScriptedSocket {
    /// Open socket with nothing to read.
    pub fn new(remote: Option<SocketAddr>) -> Self {
        let (inbound_tx, rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound: Mutex::new(Inbound { rx, leftover: BytesMut::new() }),
            written: watch::Sender::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(usize::MAX),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            closed: watch::Sender::new(false),
            close_calls: AtomicUsize::new(0),
            remote,
        }
    }

    /// Queue bytes for the session to read.
    pub fn feed(&self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        let _ = self.inbound_tx.send(Ok(bytes));
    }

    /// Queue end of stream.
    pub fn feed_eof(&self) {
        let _ = self.inbound_tx.send(Ok(Bytes::new()));
    }

    /// Queue a read failure.
    pub fn feed_error(&self, kind: io::ErrorKind) {
        let _ = self.inbound_tx.send(Err(io::Error::new(kind, "scripted read failure")));
    }

    /// Frames written so far, in write order.
    pub fn written(&self) -> Vec<Bytes> {
        self.written.borrow().clone()
    }

    /// Wait until at least `count` writes completed.
    pub async fn wait_for_writes(&self, count: usize) -> Vec<Bytes> {
        let mut rx = self.written.subscribe();
        match rx.wait_for(|written| written.len() >= count).await {
            Ok(written) => written.clone(),
            Err(_) => self.written(),
        }
    }

    /// Write attempts, including held, failed, and completed ones.
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Park every subsequent write until released.
    pub fn hold_writes(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `count` parked (or future) writes proceed.
    pub fn release_writes(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Fail the write attempt with zero-based index `attempt`.
    pub fn fail_write_at(&self, attempt: usize) {
        self.fail_at.store(attempt, Ordering::SeqCst);
    }

    /// Times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until the socket is closed.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[async_trait]
impl SessionSocket for ScriptedSocket {
    fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound.lock().await;

        if inbound.leftover.is_empty() {
            let next = tokio::select! {
                next = inbound.rx.recv() => next,
                _ = closed.wait_for(|closed| *closed) => return Err(closed_error()),
            };
            match next {
                None => return Ok(0),
                Some(Err(error)) => return Err(error),
                Some(Ok(bytes)) if bytes.is_empty() => return Ok(0),
                Some(Ok(bytes)) => inbound.leftover.extend_from_slice(&bytes),
            }
        }

        let n = buf.len().min(inbound.leftover.len());
        buf[..n].copy_from_slice(&inbound.leftover[..n]);
        inbound.leftover.advance(n);
        Ok(n)
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if !self.is_connected() {
            return Err(closed_error());
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.gated.load(Ordering::SeqCst) {
            let mut closed = self.closed.subscribe();
            tokio::select! {
                permit = self.gate.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(closed_error()),
                },
                _ = closed.wait_for(|closed| *closed) => return Err(closed_error()),
            }
        }

        if self.fail_at.load(Ordering::SeqCst) == attempt {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }

        self.written.send_modify(|written| written.push(Bytes::copy_from_slice(buf)));
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.send_replace(true) {
            return Err(closed_error());
        }
        self.gate.close();
        Ok(())
    }

    fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.remote
    }
}

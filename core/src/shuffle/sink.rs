//! Output sinks that the owning storage can take back.
//!
//! Each sink handed out by a medium writes through a [`SinkSlot`]. Once the
//! medium detaches the slot (on publish, discard or a newer sink), further
//! writes through that sink fail with `BrokenPipe`, so a writer that outlives
//! the commit can never change published bytes.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Shared ownership of one generation of staged output.
#[derive(Debug)]
pub(crate) struct SinkSlot<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W> SinkSlot<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    pub(crate) fn writer(&self) -> DetachableWriter<W> {
        DetachableWriter {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take the staged output back; every writer of this slot is cut off.
    pub(crate) fn detach(&self) -> Option<W> {
        lock(&self.inner).take()
    }
}

fn lock<W>(inner: &Mutex<Option<W>>) -> MutexGuard<'_, Option<W>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn detached() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "output sink was detached from its fetched input",
    )
}

/// Writer side of a [`SinkSlot`].
pub(crate) struct DetachableWriter<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W: AsyncWrite + Unpin> AsyncWrite for DetachableWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match lock(&self.inner).as_mut() {
            Some(writer) => Pin::new(writer).poll_write(cx, buf),
            None => Poll::Ready(Err(detached())),
        }
    }

    // Detached output was already flushed by whoever took it.
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match lock(&self.inner).as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    // The staged output stays open until the medium publishes or discards it.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match lock(&self.inner).as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

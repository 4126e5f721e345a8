//! `AsyncRead`/`AsyncWrite` adapter for [`RemoteFile`]
//!
//! The stream owns the file and runs one remote operation at a time as a
//! boxed future that hands the file back when it finishes. Writes are
//! accepted as soon as they are started and complete in the background of
//! the next poll; an error from a write is reported by whichever operation
//! polls it to completion, as with `tokio::fs::File`.

use crate::file::RemoteFile;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What a finished operation produced
enum Done {
    Nothing,
    Read(Bytes),
    Wrote,
    Flushed,
    Closed,
}

type Pending = BoxFuture<'static, (Box<RemoteFile>, io::Result<Done>)>;

/// A [`RemoteFile`] usable with `tokio::io` combinators
pub struct RemoteFileStream {
    /// Present while idle
    file: Option<Box<RemoteFile>>,
    /// Present while an operation is in flight; owns the file meanwhile
    pending: Option<Pending>,
    /// Tail of a read that did not fit the caller's buffer
    leftover: Bytes,
}

impl std::fmt::Debug for RemoteFileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileStream")
            .field("file", &self.file)
            .field("busy", &self.pending.is_some())
            .field("leftover", &self.leftover.len())
            .finish()
    }
}

impl From<RemoteFile> for RemoteFileStream {
    fn from(file: RemoteFile) -> Self {
        Self::new(file)
    }
}

impl RemoteFileStream {
    #[must_use]
    pub fn new(file: RemoteFile) -> Self {
        Self {
            file: Some(Box::new(file)),
            pending: None,
            leftover: Bytes::new(),
        }
    }

    /// The file, unless an operation currently holds it
    #[must_use]
    pub fn get_ref(&self) -> Option<&RemoteFile> {
        self.file.as_deref()
    }

    /// Wait for any in-flight operation and return the file
    ///
    /// Buffered read data not yet returned to the caller is discarded.
    pub async fn into_inner(mut self) -> io::Result<RemoteFile> {
        futures::future::poll_fn(|cx| self.poll_pending(cx)).await?;
        self.file
            .take()
            .map(|file| *file)
            .ok_or_else(|| io::Error::other("remote file stream lost its file"))
    }

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<Done>> {
        let Some(future) = self.pending.as_mut() else {
            return Poll::Ready(Ok(Done::Nothing));
        };
        let (file, result) = ready!(future.as_mut().poll(cx));
        self.pending = None;
        self.file = Some(file);
        Poll::Ready(result)
    }

    fn start<F>(&mut self, op: impl FnOnce(Box<RemoteFile>) -> F) -> io::Result<()>
    where
        F: Future<Output = (Box<RemoteFile>, io::Result<Done>)> + Send + 'static,
    {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::other("remote file stream is busy"))?;
        self.pending = Some(Box::pin(op(file)));
        Ok(())
    }

    fn take_leftover(&mut self, buf: &mut ReadBuf<'_>) {
        let n = self.leftover.len().min(buf.remaining());
        buf.put_slice(&self.leftover.split_to(n));
    }
}

impl AsyncRead for RemoteFileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.leftover.is_empty() {
            this.take_leftover(buf);
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.pending.is_some() {
                if let Done::Read(data) = ready!(this.poll_pending(cx))? {
                    this.leftover = data;
                    this.take_leftover(buf);
                    return Poll::Ready(Ok(()));
                }
                continue;
            }

            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            let count = buf.remaining();
            this.start(move |mut file| async move {
                let mut data = vec![0u8; count];
                let result = file
                    .read(&mut data)
                    .await
                    .map(|n| {
                        data.truncate(n);
                        Done::Read(Bytes::from(data))
                    })
                    .map_err(io::Error::from);
                (file, result)
            })?;
        }
    }
}

impl AsyncWrite for RemoteFileStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        // Finish the previous operation; its error belongs to this call.
        ready!(this.poll_pending(cx))?;

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let data = Bytes::copy_from_slice(buf);
        this.start(move |mut file| async move {
            let result = file
                .write_all(&data)
                .await
                .map(|()| Done::Wrote)
                .map_err(io::Error::from);
            (file, result)
        })?;

        // Get the write going now; a failure that shows up immediately is
        // reported immediately.
        if let Poll::Ready(Err(e)) = this.poll_pending(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pending.is_some() {
                if let Done::Flushed = ready!(this.poll_pending(cx))? {
                    return Poll::Ready(Ok(()));
                }
                continue;
            }
            this.start(|mut file| async move {
                let result = file
                    .flush()
                    .await
                    .map(|()| Done::Flushed)
                    .map_err(io::Error::from);
                (file, result)
            })?;
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pending.is_some() {
                if let Done::Closed = ready!(this.poll_pending(cx))? {
                    return Poll::Ready(Ok(()));
                }
                continue;
            }
            this.start(|mut file| async move {
                let result = file
                    .close()
                    .await
                    .map(|()| Done::Closed)
                    .map_err(io::Error::from);
                (file, result)
            })?;
        }
    }
}

//! Fallback relay for non-Reflex traffic.
//!
//! Connections that fail classification or authentication are forwarded
//! verbatim to a configured origin on loopback. Bytes already consumed
//! during classification are replayed ahead of the live stream, so the
//! origin sees exactly what the peer sent.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::proxy::ActivityTimer;

/// A stream adapter that yields previously-consumed bytes before falling
/// through to the underlying connection. Writes pass straight through.
pub struct PreloadedStream<S> {
    buffered: Vec<u8>,
    offset: usize,
    inner: S,
}

impl<S> PreloadedStream<S> {
    /// Wrap `inner`, replaying `buffered` on the first reads.
    pub fn new(buffered: Vec<u8>, inner: S) -> Self {
        Self {
            buffered,
            offset: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreloadedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.offset < this.buffered.len() {
            let n = buf.remaining().min(this.buffered.len() - this.offset);
            buf.put_slice(&this.buffered[this.offset..this.offset + n]);
            this.offset += n;
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreloadedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Relay a connection to the fallback origin on `127.0.0.1:port`.
///
/// `consumed` holds the bytes already read off the stream during
/// classification; they reach the origin first. Copying runs both ways
/// until either side closes or the idle timer fires.
pub async fn relay_to_fallback<S>(
    stream: S,
    consumed: Vec<u8>,
    port: u32,
    idle: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let origin = TcpStream::connect(("127.0.0.1", port as u16))
        .await
        .map_err(|e| Error::DialFailed(format!("fallback origin: {e}")))?;
    origin.set_nodelay(true)?;

    let wrapped = PreloadedStream::new(consumed, stream);
    let (mut client_read, mut client_write) = tokio::io::split(wrapped);
    let (mut origin_read, mut origin_write) = origin.into_split();

    let timer = ActivityTimer::new(idle);

    let to_origin = copy_with_timer(&mut client_read, &mut origin_write, &timer);
    let to_client = copy_with_timer(&mut origin_read, &mut client_write, &timer);

    tokio::select! {
        res = async { tokio::try_join!(to_origin, to_client) } => {
            res?;
            Ok(())
        }
        _ = timer.expired() => Ok(()),
    }
}

/// Copy bytes until EOF, refreshing the idle timer on each transfer.
async fn copy_with_timer<R, W>(reader: &mut R, writer: &mut W, timer: &ActivityTimer) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buf = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await.ok();
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        timer.touch();
    }
}

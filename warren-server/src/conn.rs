//! Public connection wrapper.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Byte stream a public connection may arrive over (plain TCP or TLS).
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// A live connection from the public internet.
///
/// Detection consumes bytes from the socket before the owning tunnel is
/// known; those bytes are retained here and replayed ahead of the live
/// stream, so whatever the connection is handed to reads the byte stream
/// exactly as the client sent it. Dropping the connection closes it.
pub struct PublicConn {
    stream: Box<dyn AsyncStream>,
    peer: SocketAddr,
    replay: Bytes,
}

impl PublicConn {
    pub fn new(stream: Box<dyn AsyncStream>, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            replay: Bytes::new(),
        }
    }

    /// Address of the remote peer, captured at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Retain bytes already consumed from the stream; subsequent reads
    /// yield them before touching the socket again.
    pub(crate) fn set_replay(&mut self, bytes: Bytes) {
        self.replay = bytes;
    }
}

impl AsyncRead for PublicConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.replay.is_empty() {
            let n = buf.remaining().min(self.replay.len());
            let chunk = self.replay.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for PublicConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

//! Byte transports underneath a Bolt connection.
//!
//! The framing layer only needs `write`, `flush` and `read`; anything that
//! provides them can carry a connection. [`StreamTransport`] adapts any tokio
//! stream (TCP in production), [`MemoryTransport`] keeps everything in memory
//! and records each write separately, which makes chunk boundaries visible.

use std::future::Future;
use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte-oriented duplex channel.
///
/// A `read` returning an empty buffer means the peer closed the channel.
pub trait Transport: Send {
    /// Write some prefix of `bytes`, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Push buffered bytes to the peer.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Read at most `max` bytes.
    fn read(&mut self, max: usize) -> impl Future<Output = io::Result<Bytes>> + Send;

    /// Close the write side.
    fn shutdown(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Write all of `bytes`, one [`Transport::write`] call per accepted prefix.
pub(crate) async fn write_fully<T: Transport>(transport: &mut T, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        let n = transport.write(bytes).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes"));
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

// ============================================================================
// StreamTransport
// ============================================================================

/// Object-safe bound for streams a pool can hand around.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<S> AsyncStream for S where S: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// [`Transport`] over a tokio stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream.write(bytes).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    async fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let mut buf = vec![0u8; max];
        let n = self.stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// In-memory [`Transport`].
///
/// Each `write` call is kept as its own entry in [`writes`](Self::writes);
/// reads are served from bytes queued with [`push_inbound`](Self::push_inbound).
#[derive(Debug, Default)]
pub struct MemoryTransport {
    writes: Vec<Bytes>,
    flushes: usize,
    inbound: BytesMut,
    shut_down: bool,
}

impl MemoryTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose peer has already sent `bytes`.
    pub fn with_inbound(bytes: &[u8]) -> Self {
        let mut transport = Self::new();
        transport.push_inbound(bytes);
        transport
    }

    /// Queue bytes for subsequent reads.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Every write, in order.
    pub fn writes(&self) -> &[Bytes] {
        &self.writes
    }

    /// All written bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|w| w.iter().copied()).collect()
    }

    /// Number of flush calls.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Forget recorded writes and flushes.
    pub fn clear(&mut self) {
        self.writes.clear();
        self.flushes = 0;
    }

    /// Whether `shutdown` was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Transport for MemoryTransport {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.shut_down {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport shut down"));
        }
        self.writes.push(Bytes::copy_from_slice(bytes));
        Ok(bytes.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    async fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let n = max.min(self.inbound.remaining());
        Ok(self.inbound.split_to(n).freeze())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_records_each_write() {
        let mut t = MemoryTransport::new();
        write_fully(&mut t, &[1, 2, 3]).await.unwrap();
        t.write(&[4]).await.unwrap();
        t.flush().await.unwrap();

        assert_eq!(t.writes().len(), 2);
        assert_eq!(t.written(), vec![1, 2, 3, 4]);
        assert_eq!(t.flushes(), 1);
    }

    #[tokio::test]
    async fn test_memory_transport_reads_then_eof() {
        let mut t = MemoryTransport::with_inbound(&[9, 8, 7]);
        assert_eq!(&t.read(2).await.unwrap()[..], &[9, 8]);
        assert_eq!(&t.read(10).await.unwrap()[..], &[7]);
        assert!(t.read(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_transport_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut a = StreamTransport::new(client);
        let mut b = StreamTransport::new(server);

        write_fully(&mut a, b"ping").await.unwrap();
        a.flush().await.unwrap();
        assert_eq!(&b.read(16).await.unwrap()[..], b"ping");

        a.shutdown().await.unwrap();
        assert!(b.read(16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let mut t = MemoryTransport::new();
        t.shutdown().await.unwrap();
        assert!(t.write(&[1]).await.is_err());
    }
}

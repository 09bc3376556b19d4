//! Chunked message framing.
//!
//! A Bolt message travels as a sequence of chunks, each a big-endian `u16`
//! length followed by that many bytes, and ends with a zero-length chunk:
//!
//! ```text
//! chunk      := length:u16 data:byte[length]    (length > 0)
//! end-marker := 0x00 0x00
//! message    := chunk* end-marker
//! ```
//!
//! [`ChunkFramer`] packs outgoing bytes into chunks of a fixed capacity and
//! hands each finished chunk to the [`Transport`] as a single write followed by
//! a flush. [`ChunkReader`] reassembles inbound chunks into whole messages.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::error::{BoltError, BoltResult};
use super::transport::{write_fully, Transport};

/// Smallest chunk capacity: header plus room for real data.
pub const MIN_CHUNK_CAPACITY: usize = 8;

/// Largest chunk capacity whose data length still fits the `u16` header.
pub const MAX_CHUNK_CAPACITY: usize = u16::MAX as usize + HEADER_SIZE;

/// Capacity used when none is configured.
pub const DEFAULT_CHUNK_CAPACITY: usize = 8192;

/// Largest message the reader assembles by default (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Zero-length chunk that terminates a message.
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

const HEADER_SIZE: usize = 2;

/// How much to ask the transport for per read.
const READ_SIZE: usize = 8192;

// ============================================================================
// ChunkFramer
// ============================================================================

/// Packs outgoing message bytes into length-prefixed chunks.
///
/// The first two bytes of the buffer are reserved for the length header of
/// the chunk being filled and patched just before it is sent, so `position`
/// never drops below 2.
#[derive(Debug)]
pub struct ChunkFramer {
    buffer: Box<[u8]>,
    position: usize,
}

impl ChunkFramer {
    /// Create a framer whose chunks (header included) hold `capacity` bytes.
    ///
    /// Fails with [`BoltError::ChunkCapacity`] unless
    /// `MIN_CHUNK_CAPACITY <= capacity <= MAX_CHUNK_CAPACITY`.
    pub fn new(capacity: usize) -> BoltResult<Self> {
        if !(MIN_CHUNK_CAPACITY..=MAX_CHUNK_CAPACITY).contains(&capacity) {
            return Err(BoltError::ChunkCapacity { capacity });
        }
        Ok(Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            position: HEADER_SIZE,
        })
    }

    /// Chunk capacity including the header.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Data bytes buffered but not yet sent.
    pub fn pending(&self) -> usize {
        self.position - HEADER_SIZE
    }

    /// Append one byte.
    pub async fn write_byte<T: Transport>(&mut self, transport: &mut T, byte: u8) -> BoltResult<()> {
        if self.position == self.capacity() {
            self.close_and_send(transport).await?;
        }
        self.buffer[self.position] = byte;
        self.position += 1;
        Ok(())
    }

    /// Append bytes, sending every chunk that fills up along the way.
    ///
    /// Produces exactly the same transport traffic as calling
    /// [`write_byte`](Self::write_byte) for each byte.
    pub async fn write<T: Transport>(&mut self, transport: &mut T, bytes: &[u8]) -> BoltResult<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            if self.position == self.capacity() {
                self.close_and_send(transport).await?;
            }
            let n = rest.len().min(self.capacity() - self.position);
            self.buffer[self.position..self.position + n].copy_from_slice(&rest[..n]);
            self.position += n;
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Patch the header with the buffered data length, send the chunk as one
    /// write, flush, and start a fresh chunk.
    pub async fn close_and_send<T: Transport>(&mut self, transport: &mut T) -> BoltResult<()> {
        self.patch_header();
        let end = self.position;
        self.send(transport, end).await
    }

    /// Send the buffered chunk if it holds any data. Does nothing, not even a
    /// transport flush, when the buffer is empty.
    pub async fn flush<T: Transport>(&mut self, transport: &mut T) -> BoltResult<()> {
        if self.position > HEADER_SIZE {
            self.close_and_send(transport).await?;
        }
        Ok(())
    }

    /// Terminate the current message with the zero-length end marker.
    ///
    /// When the buffer has room for the marker it is appended behind the
    /// pending chunk and both leave in one write. Otherwise the pending chunk
    /// is sent at its real length and the marker follows as its own write.
    /// Either way nothing is left buffered afterwards.
    pub async fn write_message_tail<T: Transport>(&mut self, transport: &mut T) -> BoltResult<()> {
        if self.position == HEADER_SIZE {
            // Header slot alone becomes the marker.
            return self.close_and_send(transport).await;
        }

        if self.capacity() - self.position >= END_MARKER.len() {
            self.patch_header();
            let end = self.position + END_MARKER.len();
            self.buffer[self.position..end].copy_from_slice(&END_MARKER);
            return self.send(transport, end).await;
        }

        self.close_and_send(transport).await?;
        self.close_and_send(transport).await
    }

    fn patch_header(&mut self) {
        let len = (self.position - HEADER_SIZE) as u16;
        self.buffer[..HEADER_SIZE].copy_from_slice(&len.to_be_bytes());
    }

    async fn send<T: Transport>(&mut self, transport: &mut T, end: usize) -> BoltResult<()> {
        write_fully(transport, &self.buffer[..end]).await?;
        self.position = HEADER_SIZE;
        transport.flush().await?;
        Ok(())
    }
}

impl Default for ChunkFramer {
    fn default() -> Self {
        Self {
            buffer: vec![0u8; DEFAULT_CHUNK_CAPACITY].into_boxed_slice(),
            position: HEADER_SIZE,
        }
    }
}

// ============================================================================
// ChunkReader
// ============================================================================

/// Reassembles chunked messages from inbound bytes.
///
/// Usable directly as a [`Decoder`], or through
/// [`read_message`](Self::read_message) which pulls bytes from a
/// [`Transport`] until a full message is available.
#[derive(Debug)]
pub struct ChunkReader {
    assembly: MessageAssembly,
    inbound: BytesMut,
}

/// Chunks of the message being assembled.
#[derive(Debug)]
struct MessageAssembly {
    max_message_size: usize,
    message: BytesMut,
    in_message: bool,
}

impl ChunkReader {
    /// Reader with the default message size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Reader that rejects messages larger than `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            assembly: MessageAssembly {
                max_message_size,
                message: BytesMut::with_capacity(4096),
                in_message: false,
            },
            inbound: BytesMut::with_capacity(READ_SIZE),
        }
    }

    /// Whether some but not all chunks of a message have arrived.
    pub fn is_mid_message(&self) -> bool {
        self.assembly.in_message
    }

    /// Read the next complete message from `transport`.
    ///
    /// A transport that closes between messages yields
    /// [`BoltError::ConnectionClosed`]; one that closes inside a chunk or
    /// between the chunks of a message yields [`BoltError::Framing`].
    ///
    /// Cancel safe as long as `transport.read` is: bytes received before the
    /// future is dropped stay buffered for the next call.
    pub async fn read_message<T: Transport>(&mut self, transport: &mut T) -> BoltResult<BytesMut> {
        loop {
            if let Some(message) = self.assembly.decode(&mut self.inbound)? {
                return Ok(message);
            }
            let bytes = transport.read(READ_SIZE).await?;
            if bytes.is_empty() {
                return match self.assembly.decode_eof(&mut self.inbound)? {
                    Some(message) => Ok(message),
                    None => Err(BoltError::ConnectionClosed),
                };
            }
            self.inbound.extend_from_slice(&bytes);
        }
    }
}

impl Default for ChunkReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkReader {
    type Item = BytesMut;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.assembly.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.assembly.decode_eof(src)
    }
}

impl Decoder for MessageAssembly {
    type Item = BytesMut;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let len = u16::from_be_bytes([src[0], src[1]]) as usize;

            if len == 0 {
                src.advance(HEADER_SIZE);
                if !self.in_message {
                    // NOOP keep-alive between messages.
                    continue;
                }
                self.in_message = false;
                return Ok(Some(self.message.split()));
            }

            if src.len() < HEADER_SIZE + len {
                src.reserve(HEADER_SIZE + len - src.len());
                return Ok(None);
            }

            let size = self.message.len() + len;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(HEADER_SIZE);
            self.message.extend_from_slice(&src[..len]);
            src.advance(len);
            self.in_message = true;
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        match (src.len(), self.in_message) {
            (0, false) => Ok(None),
            (1, _) => Err(BoltError::Framing("stream closed inside a chunk header".into())),
            (0, true) => Err(BoltError::Framing(
                "stream closed before the message end marker".into(),
            )),
            (n, _) => {
                let declared = u16::from_be_bytes([src[0], src[1]]);
                Err(BoltError::Framing(format!(
                    "stream closed inside a chunk: {} of {} bytes received",
                    n - HEADER_SIZE,
                    declared
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::transport::MemoryTransport;

    #[test]
    fn test_capacity_bounds() {
        assert!(matches!(ChunkFramer::new(7), Err(BoltError::ChunkCapacity { capacity: 7 })));
        assert!(ChunkFramer::new(8).is_ok());
        assert!(ChunkFramer::new(65537).is_ok());
        assert!(matches!(
            ChunkFramer::new(65538),
            Err(BoltError::ChunkCapacity { capacity: 65538 })
        ));
    }

    #[tokio::test]
    async fn test_largest_chunk_header() {
        let mut framer = ChunkFramer::new(MAX_CHUNK_CAPACITY).unwrap();
        let mut t = MemoryTransport::new();
        framer.write(&mut t, &vec![0xAB; 65535]).await.unwrap();
        framer.flush(&mut t).await.unwrap();

        assert_eq!(t.writes().len(), 1);
        assert_eq!(&t.writes()[0][..2], &[0xFF, 0xFF]);
        assert_eq!(t.writes()[0].len(), 65537);
    }

    #[tokio::test]
    async fn test_tail_with_nothing_pending() {
        let mut framer = ChunkFramer::new(16).unwrap();
        let mut t = MemoryTransport::new();
        framer.write_message_tail(&mut t).await.unwrap();

        assert_eq!(t.writes().len(), 1);
        assert_eq!(&t.writes()[0][..], &END_MARKER);
        assert_eq!(t.flushes(), 1);
    }

    #[tokio::test]
    async fn test_tail_with_spare_room_goes_out_with_chunk() {
        let mut framer = ChunkFramer::new(16).unwrap();
        let mut t = MemoryTransport::new();
        framer.write(&mut t, &[1, 2, 3]).await.unwrap();
        framer.write_message_tail(&mut t).await.unwrap();

        assert_eq!(t.writes().len(), 1);
        assert_eq!(&t.writes()[0][..], &[0, 3, 1, 2, 3, 0, 0]);
        assert_eq!(framer.pending(), 0);

        // Nothing left for a later flush.
        framer.flush(&mut t).await.unwrap();
        assert_eq!(t.flushes(), 1);
    }

    #[tokio::test]
    async fn test_tail_with_full_buffer() {
        let mut framer = ChunkFramer::new(8).unwrap();
        let mut t = MemoryTransport::new();
        framer.write(&mut t, &[1, 2, 3, 4, 5, 6]).await.unwrap();
        framer.write_message_tail(&mut t).await.unwrap();

        let writes: Vec<&[u8]> = t.writes().iter().map(|w| &w[..]).collect();
        assert_eq!(writes, vec![&[0, 6, 1, 2, 3, 4, 5, 6][..], &[0, 0][..]]);
    }

    #[test]
    fn test_decode_across_chunks() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0, 2, b'a', b'b', 0, 1, b'c', 0, 0][..]);
        let message = reader.decode(&mut src).unwrap().unwrap();
        assert_eq!(&message[..], b"abc");
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_waits_for_whole_chunk() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0, 3, b'a'][..]);
        assert!(reader.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(&[b'b', b'c', 0, 0]);
        assert_eq!(&reader.decode(&mut src).unwrap().unwrap()[..], b"abc");
    }

    #[test]
    fn test_decode_skips_noop() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0, 0, 0, 0, 0, 1, b'x', 0, 0][..]);
        assert_eq!(&reader.decode(&mut src).unwrap().unwrap()[..], b"x");
    }

    #[test]
    fn test_message_size_limit() {
        let mut reader = ChunkReader::with_max_message_size(4);
        let mut src = BytesMut::from(&[0, 3, 1, 2, 3, 0, 2, 4, 5, 0, 0][..]);
        let err = reader.decode(&mut src).unwrap_err();
        assert!(matches!(err, BoltError::MessageTooLarge { size: 5, max: 4 }));
    }

    #[test]
    fn test_eof_mid_header() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0][..]);
        assert!(matches!(reader.decode_eof(&mut src), Err(BoltError::Framing(_))));
    }

    #[test]
    fn test_eof_mid_chunk() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0, 4, 1, 2][..]);
        let err = reader.decode_eof(&mut src).unwrap_err();
        assert!(err.to_string().contains("2 of 4"));
    }

    #[test]
    fn test_eof_between_chunks_of_message() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::from(&[0, 1, 7][..]);
        assert!(matches!(reader.decode_eof(&mut src), Err(BoltError::Framing(_))));
    }

    #[test]
    fn test_eof_at_boundary_is_clean() {
        let mut reader = ChunkReader::new();
        let mut src = BytesMut::new();
        assert!(reader.decode_eof(&mut src).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_message_from_transport() {
        let mut t = MemoryTransport::with_inbound(&[0, 2, 1, 2, 0, 0, 0, 1, 9, 0, 0]);
        let mut reader = ChunkReader::new();
        assert_eq!(&reader.read_message(&mut t).await.unwrap()[..], &[1, 2]);
        assert_eq!(&reader.read_message(&mut t).await.unwrap()[..], &[9]);
        assert!(matches!(
            reader.read_message(&mut t).await,
            Err(BoltError::ConnectionClosed)
        ));
    }
}

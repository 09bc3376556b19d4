//! # Bolt Protocol Layer
//!
//! Wire-level pieces of the driver, from bytes up to a single connection.
//!
//! ## Layers
//!
//! - [`transport`] - byte channel abstraction (TCP stream, in-memory)
//! - [`chunk`] - chunked message framing over a transport
//! - [`packstream`] - binary serialization of values
//! - [`message`] - request and response messages
//! - [`codec`] - message <-> bytes seam used by the connection
//! - [`handshake`] - version negotiation
//! - [`connection`] - one connection with failure-state tracking
//!
//! Most users should use the high-level [`crate::driver`] module instead of
//! interacting with these types directly.

pub mod chunk;
pub mod codec;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod transport;

pub use chunk::{
    ChunkFramer, ChunkReader, DEFAULT_CHUNK_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE, END_MARKER,
    MAX_CHUNK_CAPACITY, MIN_CHUNK_CAPACITY,
};
pub use codec::{MessageCodec, PackStreamCodec};
pub use connection::{Connection, ConnectionState};
pub use error::{BoltError, BoltErrorCode, BoltResult};
pub use handshake::{BoltVersion, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE};
pub use message::{
    BoltRequest, BoltResponse, FailureMessage, HelloMessage, RequestExtra, RunMessage,
    StreamControl, SuccessMessage, ALL_RECORDS,
};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue};
pub use transport::{AsyncStream, BoxedStream, MemoryTransport, StreamTransport, Transport};

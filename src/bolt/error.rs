//! Bolt protocol error types.

use std::io;

use thiserror::Error;

use super::chunk::{MAX_CHUNK_CAPACITY, MIN_CHUNK_CAPACITY};
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Debug, Error)]
pub enum BoltError {
    /// Transport failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Chunk capacity outside the framable range
    #[error(
        "Chunk capacity {capacity} out of range ({min}..={max})",
        min = MIN_CHUNK_CAPACITY,
        max = MAX_CHUNK_CAPACITY
    )]
    ChunkCapacity {
        /// Requested capacity
        capacity: usize,
    },

    /// Truncated or malformed chunk stream
    #[error("Framing error: {0}")]
    Framing(String),

    /// Assembled message exceeds the configured limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Bytes assembled so far
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Message body could not be encoded or decoded
    #[error("PackStream error: {0}")]
    PackStream(#[from] PackStreamError),

    /// Unexpected message for the current exchange
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Version negotiation failed
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Server answered a request with FAILURE
    #[error("Server failure: {code} - {message}")]
    Server {
        /// Server error code
        code: String,
        /// Server message
        message: String,
    },

    /// Connection is closed or defunct
    #[error("Connection closed")]
    ConnectionClosed,
}

impl BoltError {
    /// Framing and transport errors leave the byte stream in an unknown
    /// position; the connection cannot be reused after one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BoltError::Io(_)
                | BoltError::Framing(_)
                | BoltError::MessageTooLarge { .. }
                | BoltError::PackStream(_)
                | BoltError::Protocol(_)
                | BoltError::Handshake(_)
                | BoltError::ConnectionClosed
        )
    }
}

/// Well-known server error codes.
pub struct BoltErrorCode;

impl BoltErrorCode {
    /// Prefix of errors caused by the request itself
    pub const CLIENT_ERROR_PREFIX: &'static str = "Neo.ClientError.";
    /// Prefix of authentication and authorization failures
    pub const SECURITY_PREFIX: &'static str = "Neo.ClientError.Security.";
    /// Prefix of errors that may go away on retry
    pub const TRANSIENT_PREFIX: &'static str = "Neo.TransientError.";
    /// Write sent to a cluster member that cannot accept writes
    pub const NOT_A_LEADER: &'static str = "Neo.ClientError.Cluster.NotALeader";
    /// Write sent to a read-only database
    pub const FORBIDDEN_ON_READ_ONLY_DATABASE: &'static str =
        "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";
    /// Statement did not parse
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
}

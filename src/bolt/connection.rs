//! A single Bolt connection.
//!
//! [`Connection`] owns one transport, the chunk framer and reader for it, and
//! the message codec. It tracks two independent things:
//!
//! - the server-side *failure state*: set when a request is answered with
//!   FAILURE, after which the server ignores everything until a RESET is
//!   acknowledged. [`reset_if_failed`](Connection::reset_if_failed) clears it
//!   and must run before every new statement;
//! - the *health* of the byte stream: any transport, framing or decoding error
//!   leaves the stream at an unknown position, so the connection becomes
//!   [`ConnectionState::Defunct`] and refuses further use. So does a send
//!   that was cancelled before the whole message went out.
//!
//! It also counts requests still waiting for their summary reply, so a caller
//! that was cancelled mid-exchange can tell the reply stream is behind and
//! [`reset`](Connection::reset) can skip exactly what is left.

use std::collections::HashMap;
use std::fmt;

use super::chunk::{ChunkFramer, ChunkReader, DEFAULT_MAX_MESSAGE_SIZE};
use super::codec::{MessageCodec, PackStreamCodec};
use super::error::{BoltError, BoltResult};
use super::handshake::{handshake_request, BoltVersion, HANDSHAKE_RESPONSE_SIZE};
use super::message::{BoltRequest, BoltResponse, HelloMessage, SuccessMessage};
use super::packstream::PackStreamValue;
use super::transport::{write_fully, Transport};

/// Connection health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, version not yet negotiated
    Connected,
    /// Handshake done, accepting messages
    Ready,
    /// Stream broken; must be discarded
    Defunct,
    /// Closed by the client
    Closed,
}

/// Client side of one Bolt connection.
pub struct Connection<T: Transport> {
    transport: T,
    framer: ChunkFramer,
    reader: ChunkReader,
    codec: Box<dyn MessageCodec>,
    failure_state: bool,
    state: ConnectionState,
    /// Requests sent whose SUCCESS, FAILURE or IGNORED has not been read
    pending_replies: usize,
    /// Set while a message is being written
    writing: bool,
    protocol_version: Option<BoltVersion>,
    server_agent: Option<String>,
    connection_id: Option<String>,
}

impl<T: Transport> Connection<T> {
    /// Connection with default chunk capacity, message limit and PackStream
    /// codec.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            framer: ChunkFramer::default(),
            reader: ChunkReader::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE),
            codec: Box::new(PackStreamCodec),
            failure_state: false,
            state: ConnectionState::Connected,
            pending_replies: 0,
            writing: false,
            protocol_version: None,
            server_agent: None,
            connection_id: None,
        }
    }

    /// Connection with explicit framing limits and codec.
    ///
    /// Fails before any I/O if `chunk_capacity` is out of range.
    pub fn with_options(
        transport: T,
        chunk_capacity: usize,
        max_message_size: usize,
        codec: Box<dyn MessageCodec>,
    ) -> BoltResult<Self> {
        let mut conn = Self::new(transport);
        conn.framer = ChunkFramer::new(chunk_capacity)?;
        conn.reader = ChunkReader::with_max_message_size(max_message_size);
        conn.codec = codec;
        Ok(conn)
    }

    /// Negotiate the protocol version.
    pub async fn handshake(&mut self) -> BoltResult<BoltVersion> {
        if self.state != ConnectionState::Connected {
            return Err(BoltError::Handshake(format!("cannot handshake in state {:?}", self.state)));
        }

        let result = self.exchange_versions().await;
        let version = self.check(result)?;
        self.protocol_version = Some(version);
        self.state = ConnectionState::Ready;
        tracing::debug!(%version, "bolt handshake complete");
        Ok(version)
    }

    async fn exchange_versions(&mut self) -> BoltResult<BoltVersion> {
        write_fully(&mut self.transport, &handshake_request()).await?;
        self.transport.flush().await?;

        let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
        let mut filled = 0;
        while filled < reply.len() {
            let bytes = self.transport.read(reply.len() - filled).await?;
            if bytes.is_empty() {
                return Err(BoltError::Handshake("connection closed during handshake".into()));
            }
            reply[filled..filled + bytes.len()].copy_from_slice(&bytes);
            filled += bytes.len();
        }

        BoltVersion::from_bytes(reply).ok_or_else(|| {
            BoltError::Handshake(format!("server proposed no supported version: {:02X?}", reply))
        })
    }

    /// Send HELLO and record what the server says about itself.
    ///
    /// A rejected HELLO leaves the connection defunct; servers close the
    /// socket after an authentication failure.
    pub async fn hello(
        &mut self,
        user_agent: &str,
        auth: HashMap<String, PackStreamValue>,
    ) -> BoltResult<SuccessMessage> {
        let request = BoltRequest::Hello(HelloMessage::new(user_agent).with_auth(auth));
        match self.request(&request).await {
            Ok(success) => {
                self.server_agent = success.server().map(String::from);
                self.connection_id = success.connection_id().map(String::from);
                Ok(success)
            }
            Err(e) => {
                self.state = ConnectionState::Defunct;
                Err(e)
            }
        }
    }

    /// Encode `request`, frame it, terminate it with the end marker and flush.
    pub async fn send_message(&mut self, request: &BoltRequest) -> BoltResult<()> {
        self.ensure_ready()?;
        let body = self.codec.encode(request)?;
        tracing::trace!(message = request.name(), bytes = body.len(), "C: send");

        if !matches!(request, BoltRequest::Goodbye) {
            self.pending_replies += 1;
        }
        self.writing = true;
        let result = self.write_framed(&body).await;
        self.writing = false;
        self.check(result)
    }

    async fn write_framed(&mut self, body: &[u8]) -> BoltResult<()> {
        self.framer.write(&mut self.transport, body).await?;
        self.framer.write_message_tail(&mut self.transport).await?;
        self.framer.flush(&mut self.transport).await
    }

    /// Read and decode one message.
    ///
    /// A FAILURE reply puts the connection into failure state and comes back
    /// as [`BoltError::Server`]. IGNORED replies are returned as they are.
    pub async fn receive_message(&mut self) -> BoltResult<BoltResponse> {
        self.ensure_ready()?;
        let body = self.reader.read_message(&mut self.transport).await;
        let body = self.check(body)?;
        let response = self.codec.decode(&body);
        let response = self.check(response)?;
        tracing::trace!(message = response.name(), "S: receive");

        if !matches!(response, BoltResponse::Record(_)) {
            self.pending_replies = self.pending_replies.saturating_sub(1);
        }
        match response {
            BoltResponse::Failure(failure) => {
                self.failure_state = true;
                tracing::debug!(code = %failure.code, "server reported failure");
                Err(BoltError::Server {
                    code: failure.code,
                    message: failure.message,
                })
            }
            other => Ok(other),
        }
    }

    /// Send one request and expect a single SUCCESS in return.
    pub async fn request(&mut self, request: &BoltRequest) -> BoltResult<SuccessMessage> {
        self.send_message(request).await?;
        match self.receive_message().await? {
            BoltResponse::Success(success) => Ok(success),
            BoltResponse::Ignored => Err(BoltError::Protocol(format!(
                "{} ignored by server",
                request.name()
            ))),
            other => {
                let err = BoltError::Protocol(format!(
                    "unexpected {} in reply to {}",
                    other.name(),
                    request.name()
                ));
                self.check(Err(err))
            }
        }
    }

    /// Acknowledge a previous failure with RESET, if there is one.
    ///
    /// A no-op when the connection is not in failure state.
    pub async fn reset_if_failed(&mut self) -> BoltResult<()> {
        if !self.failure_state {
            return Ok(());
        }
        self.reset().await
    }

    /// Send RESET and wait for its SUCCESS, skipping replies to requests that
    /// were still in flight. Clears the failure state.
    pub async fn reset(&mut self) -> BoltResult<()> {
        tracing::debug!(
            failed = self.failure_state,
            pending = self.pending_replies,
            "resetting connection"
        );
        self.send_message(&BoltRequest::Reset).await?;
        loop {
            match self.receive_message().await {
                // RESET is answered last.
                Ok(BoltResponse::Success(_)) if self.pending_replies == 0 => {
                    self.failure_state = false;
                    return Ok(());
                }
                // Replies to requests still in flight.
                Ok(_) => continue,
                Err(e) => {
                    // A connection that cannot be reset cannot be trusted.
                    self.state = ConnectionState::Defunct;
                    return Err(e);
                }
            }
        }
    }

    /// Say GOODBYE and shut the transport down. Never fails; safe to call
    /// more than once.
    pub async fn close(&mut self) {
        if matches!(self.state, ConnectionState::Closed) {
            return;
        }
        if self.state == ConnectionState::Ready {
            if let Err(e) = self.send_message(&BoltRequest::Goodbye).await {
                tracing::debug!(error = %e, "GOODBYE not delivered");
            }
        }
        if let Err(e) = self.transport.shutdown().await {
            tracing::debug!(error = %e, "transport shutdown failed");
        }
        self.state = ConnectionState::Closed;
    }

    /// Whether the server is waiting for a RESET.
    pub fn is_failed(&self) -> bool {
        self.failure_state
    }

    /// Whether the stream is broken.
    pub fn is_defunct(&self) -> bool {
        self.state == ConnectionState::Defunct
    }

    /// Whether the connection can carry messages.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready && !self.writing
    }

    /// Requests whose summary reply has not been read yet.
    pub fn pending_replies(&self) -> usize {
        self.pending_replies
    }

    /// Health state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Negotiated version, once the handshake is done.
    pub fn protocol_version(&self) -> Option<BoltVersion> {
        self.protocol_version
    }

    /// Server agent reported by HELLO.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// Server-assigned connection id reported by HELLO.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn ensure_ready(&mut self) -> BoltResult<()> {
        if self.writing && self.state == ConnectionState::Ready {
            tracing::debug!("previous send was cancelled; connection defunct");
            self.state = ConnectionState::Defunct;
        }
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Connected => Err(BoltError::Protocol("handshake not performed".into())),
            ConnectionState::Defunct | ConnectionState::Closed => Err(BoltError::ConnectionClosed),
        }
    }

    /// Mark the connection defunct if `result` carries a fatal error.
    fn check<R>(&mut self, result: BoltResult<R>) -> BoltResult<R> {
        if let Err(e) = &result {
            if e.is_fatal() && self.state != ConnectionState::Closed {
                tracing::debug!(error = %e, "connection defunct");
                self.state = ConnectionState::Defunct;
            }
        }
        result
    }
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("failure_state", &self.failure_state)
            .field("pending_replies", &self.pending_replies)
            .field("protocol_version", &self.protocol_version)
            .field("chunk_capacity", &self.framer.capacity())
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

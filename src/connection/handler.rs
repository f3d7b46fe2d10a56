//! Connection Handler Module
//!
//! Drives one served connection: authenticate, decode, execute, respond.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Connection admitted (slot taken)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned with its own WorkerPool
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  read token ─> verify ───────┼──> mismatch: "-ERR 1001 access denied", close
//!    │      │                       │
//!    │      ▼                       │
//!    │  parse one frame ────────────┼──> invalid: error reply, skip the bad frame
//!    │      │                       │
//!    │      ▼                       │
//!    │  submit to pool, await reply │
//!    │      │                       │
//!    │      ▼                       │
//!    │  write reply, loop           │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error: pool shut down, slot released
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP may split a frame across
//! reads or deliver several frames at once, so the parser only ever looks at
//! what is buffered and asks for more when a frame is incomplete.
//!
//! The buffer may grow to one token plus the largest frame the configured
//! limits admit, and never below 64 KB.

use crate::commands::CommandHandler;
use crate::connection::pool::{PoolClosed, PoolConfig, WorkerPool};
use crate::protocol::{AuthError, Authenticator, Command, FrameParser, ProtocolError, Response};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Floor for the read buffer limit (64 KB)
const MIN_BUFFER_LIMIT: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted by the listener
    pub connections_accepted: AtomicU64,
    /// Connections parked in the pending queue
    pub connections_queued: AtomicU64,
    /// Connections closed because the queue was full
    pub connections_rejected: AtomicU64,
    /// Connections currently being served
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Connections closed for a bad token
    pub auth_failures: AtomicU64,
    /// Frames answered with a protocol error
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_queued(&self) {
        self.connections_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_failed(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Everything a session needs besides its socket. Shared by all sessions.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub command_handler: CommandHandler,
    pub authenticator: Arc<Authenticator>,
    pub parser: FrameParser,
    pub pool: PoolConfig,
    pub stats: Arc<ConnectionStats>,
}

/// Handles a single client connection.
pub struct ConnectionHandler<S> {
    /// The client stream (buffered for writes)
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Set once the peer has closed its write side
    eof: bool,

    /// Largest the buffer may grow
    buffer_limit: usize,

    authenticator: Arc<Authenticator>,

    parser: FrameParser,

    /// Workers executing this connection's commands
    pool: WorkerPool,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler and spawns its worker pool.
    pub fn new(stream: S, addr: SocketAddr, ctx: &ConnectionContext) -> Self {
        ctx.stats.connection_opened();

        let buffer_limit = (ctx.authenticator.token_len() + ctx.parser.limits().max_frame_len())
            .max(MIN_BUFFER_LIMIT);

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            eof: false,
            buffer_limit,
            authenticator: Arc::clone(&ctx.authenticator),
            parser: ctx.parser,
            pool: WorkerPool::spawn(ctx.command_handler.clone(), ctx.pool),
            stats: Arc::clone(&ctx.stats),
        }
    }

    /// Runs the connection until the client disconnects or an error occurs.
    ///
    /// The worker pool is always shut down before this returns.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;
        self.pool.shutdown().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::AccessDenied(_) => {
                    info!(client = %self.addr, "Access denied, connection closed")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The authenticate-parse-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let token = match self.read_token().await? {
                Some(token) => token,
                None => return Ok(()),
            };

            if let Err(e) = self.authenticator.verify(&token) {
                self.stats.auth_failed();
                self.send_response(&Response::access_denied()).await?;
                return Err(ConnectionError::AccessDenied(e));
            }

            let command = match self.read_command().await {
                Ok(command) => command,
                Err(ConnectionError::ParseError(e)) => {
                    self.stats.protocol_error();
                    warn!(client = %self.addr, error = %e, "Invalid frame");
                    self.send_response(&Response::from(&e)).await?;

                    if e.is_fatal() {
                        return Err(ConnectionError::ParseError(e));
                    }
                    // The declared lengths still frame the stream
                    self.skip_rejected_frame().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            trace!(client = %self.addr, command = command.name(), "Parsed command");

            let response = self.pool.submit(command).await?;
            self.stats.command_processed();

            self.send_response(&response).await?;
        }
    }

    /// Reads the token that precedes every command.
    ///
    /// Returns `None` when the client closed the connection between commands.
    async fn read_token(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        let len = self.authenticator.token_len();

        loop {
            if self.buffer.len() >= len {
                return Ok(Some(self.buffer.split_to(len).freeze()));
            }
            if self.eof {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
            self.read_more_data().await?;
        }
    }

    /// Reads one complete command frame.
    async fn read_command(&mut self) -> Result<Command, ConnectionError> {
        loop {
            if let Some((command, consumed)) = self.parser.parse(&self.buffer, self.eof)? {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                return Ok(command);
            }

            trace!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "Incomplete frame, need more data"
            );
            self.read_more_data().await?;
        }
    }

    /// Drops the frame that failed validation, reading the rest of it first.
    async fn skip_rejected_frame(&mut self) -> Result<(), ConnectionError> {
        loop {
            let skip = self
                .parser
                .frame_len(&self.buffer, self.eof, self.buffer_limit)?;
            if let Some(len) = skip {
                let _ = self.buffer.split_to(len);
                trace!(client = %self.addr, skipped = len, "Skipped rejected frame");
                return Ok(());
            }
            self.read_more_data().await?;
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= self.buffer_limit {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // The next parse sees `eof` and decides between a clean close,
            // a missing optional TTL, and a truncated frame
            self.eof = true;
            return Ok(());
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid or truncated frame
    #[error("Parse error: {0}")]
    ParseError(#[from] ProtocolError),

    /// Token did not match the API key
    #[error("Authentication failed: {0}")]
    AccessDenied(AuthError),

    /// The stream ended inside a token
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// The worker pool stopped before answering
    #[error("Worker pool closed")]
    PoolClosed(#[from] PoolClosed),
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. The error, if
/// any, has already been logged by [`ConnectionHandler::run`].
pub async fn handle_connection<S>(stream: S, addr: SocketAddr, ctx: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ConnectionHandler::new(stream, addr, &ctx).run().await;
}

//! Connection handle and inbound frame stream
//!
//! A `Connection` is the write side of one client socket, shared between
//! that client's handler and every handler that broadcasts to it. The read
//! side is owned by the handler alone, wrapped in an `Inbound`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::error::{AppError, FrameError};
use crate::frame::{self, Decoded, Frame, FrameCodec};
use crate::types::ConnectionId;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of a live connection
///
/// Frames are written with a single `write_all` under the writer lock, so
/// frames from concurrent broadcasters never interleave.
pub struct Connection {
    id: ConnectionId,
    peer: String,
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a writer; `peer` is only used in logs
    pub fn new<W>(peer: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: ConnectionId::new(),
            peer: peer.into(),
            writer: Mutex::new(Box::new(writer)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frame `text` as sent by `sender_name` and write it
    pub async fn send(&self, text: &str, sender_name: &str) -> Result<(), AppError> {
        let bytes = frame::encode(text.as_bytes(), sender_name)?;
        self.write_frame(&bytes).await
    }

    /// Write an already encoded frame
    pub async fn write_frame(&self, bytes: &[u8]) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut the writer down
    ///
    /// Returns true only for the call that actually closed the connection.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} ({}) failed: {}", self.id, self.peer, e);
        }
        true
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// Outcome of one receive attempt
#[derive(Debug)]
pub enum Received {
    Data(Frame),
    /// Idle timeout or malformed header; nothing to act on
    Empty,
    /// End of stream or transport error
    Closed,
}

/// Read half of a connection, decoding frames with an idle timeout
pub struct Inbound<R> {
    id: ConnectionId,
    frames: FramedRead<R, FrameCodec>,
    idle_timeout: Duration,
    close_reason: Option<FrameError>,
}

impl<R: AsyncRead + Unpin> Inbound<R> {
    pub fn new(id: ConnectionId, reader: R, codec: FrameCodec, idle_timeout: Duration) -> Self {
        Self {
            id,
            frames: FramedRead::new(reader, codec),
            idle_timeout,
            close_reason: None,
        }
    }

    /// The error that ended the stream, if it ended with one
    pub fn close_reason(&self) -> Option<&FrameError> {
        self.close_reason.as_ref()
    }

    /// Wait up to the idle timeout for one frame
    ///
    /// Cancel safe: bytes read before a timeout stay buffered for the next
    /// call.
    pub async fn recv(&mut self) -> Received {
        match tokio::time::timeout(self.idle_timeout, self.frames.next()).await {
            Err(_) => Received::Empty,
            Ok(None) => {
                debug!("Connection {} reached end of stream", self.id);
                Received::Closed
            }
            Ok(Some(Ok(Decoded::Frame(frame)))) => Received::Data(frame),
            Ok(Some(Ok(Decoded::Malformed))) => {
                warn!("Malformed frame header from {}", self.id);
                Received::Empty
            }
            Ok(Some(Err(e))) => {
                match &e {
                    FrameError::ContentTooLong { .. } => {
                        warn!("Rejected frame from {}: {}", self.id, e)
                    }
                    _ => debug!("Transport error on {}: {}", self.id, e),
                }
                self.close_reason = Some(e);
                Received::Closed
            }
        }
    }
}

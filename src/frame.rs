//! Framing codec
//!
//! Every frame on the wire is a fixed-width header slot followed by the
//! raw payload:
//!
//! ```text
//! [ JSON header, space padded to HEADER_SIZE bytes ][ content_length bytes ]
//! ```
//!
//! The header is `{"content_length": N, "sender_name": "..."}`. Because the
//! slot width is constant, a receiver always knows how many bytes to read
//! before it knows the payload length.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;

use crate::error::FrameError;

/// Header width is `2^HEADER_LEN_BITS` bytes
pub const HEADER_LEN_BITS: u32 = 8;

/// Fixed width of the header slot in bytes
pub const HEADER_SIZE: usize = 1 << HEADER_LEN_BITS;

/// Byte used to pad the header up to `HEADER_SIZE`
pub const FILLER: u8 = b' ';

/// Default upper bound on an inbound payload
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    content_length: usize,
    sender_name: String,
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sender_name: String,
    pub payload: Bytes,
}

impl Frame {
    /// Payload as text; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Decoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(Frame),
    /// The header slot did not hold a valid header; it has been consumed
    Malformed,
}

/// Serialize the unpadded header text
fn header_bytes(content_length: usize, sender_name: &str) -> Result<Vec<u8>, FrameError> {
    let header = Header {
        content_length,
        sender_name: sender_name.to_string(),
    };
    Ok(serde_json::to_vec(&header)?)
}

/// Build a complete frame for `payload` sent by `sender_name`
///
/// Fails with `HeaderTooLarge` when the header text would fill the whole
/// slot; it must stay strictly under `HEADER_SIZE`.
pub fn encode(payload: &[u8], sender_name: &str) -> Result<Bytes, FrameError> {
    let header = header_bytes(payload.len(), sender_name)?;
    if header.len() >= HEADER_SIZE {
        return Err(FrameError::HeaderTooLarge {
            len: header.len(),
            limit: HEADER_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header);
    buf.put_bytes(FILLER, HEADER_SIZE - header.len());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn parse_header(slot: &[u8]) -> Option<Header> {
    let end = slot
        .iter()
        .rposition(|&b| b != FILLER)
        .map_or(0, |i| i + 1);
    serde_json::from_slice(&slot[..end]).ok()
}

/// `tokio_util` decoder for the fixed-header protocol
///
/// Keeps the parsed header between calls, so a payload that arrives over
/// several reads is stitched together without re-reading the header.
#[derive(Debug)]
pub struct FrameCodec {
    max_content_length: usize,
    pending: Option<Header>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_content_length(DEFAULT_MAX_CONTENT_LENGTH)
    }

    pub fn with_max_content_length(max_content_length: usize) -> Self {
        Self {
            max_content_length,
            pending: None,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                if src.len() < HEADER_SIZE {
                    src.reserve(HEADER_SIZE - src.len());
                    return Ok(None);
                }
                let slot = src.split_to(HEADER_SIZE);
                let Some(header) = parse_header(&slot) else {
                    return Ok(Some(Decoded::Malformed));
                };
                if header.content_length > self.max_content_length {
                    return Err(FrameError::ContentTooLong {
                        len: header.content_length,
                        limit: self.max_content_length,
                    });
                }
                header
            }
        };

        if src.len() < header.content_length {
            src.reserve(header.content_length - src.len());
            self.pending = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(header.content_length).freeze();
        Ok(Some(Decoded::Frame(Frame {
            sender_name: header.sender_name,
            payload,
        })))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        if let Some(decoded) = self.decode(src)? {
            return Ok(Some(decoded));
        }
        if self.pending.take().is_some() {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed mid-payload",
            )));
        }
        if !src.is_empty() {
            // Partial header: report it once, then the stream ends.
            src.clear();
            return Ok(Some(Decoded::Malformed));
        }
        Ok(None)
    }
}

//! Length-prefixed message framing shared by every stream the proxy touches.
//!
//! A message is a block of `Key: Value` header lines, a blank line, then a
//! body of exactly `Content-Length` bytes. The decoder is incremental:
//! arbitrary chunk boundaries and multiple messages per chunk produce the
//! same frame sequence.

use std::collections::HashMap;

use crate::error::{Error, Result};

pub const CONTENT_LENGTH: &str = "Content-Length";

/// One complete wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message exactly as it arrived, headers included. Forwarding these
    /// bytes untouched is what makes the proxy lossless.
    pub raw: Vec<u8>,
    /// The body bytes alone.
    pub body: Vec<u8>,
    /// Decoded headers, keys and values trimmed.
    pub headers: HashMap<String, String>,
}

/// Incremental decoder for a framed byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    pending: Option<PendingHeader>,
}

#[derive(Debug)]
struct PendingHeader {
    header_len: usize,
    content_len: usize,
    headers: HashMap<String, String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes from the stream. Call [`Self::next_frame`] in a loop
    /// afterwards; a single chunk may complete several messages.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete frame, or `None` until more bytes arrive.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.pending.is_none() {
            self.pending = self.parse_header_block()?;
        }
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let total = pending.header_len + pending.content_len;
        if self.buf.len() < total {
            self.pending = Some(pending);
            return Ok(None);
        }
        let raw: Vec<u8> = self.buf.drain(..total).collect();
        let body = raw[pending.header_len..].to_vec();
        Ok(Some(Frame {
            raw,
            body,
            headers: pending.headers,
        }))
    }

    /// Parses the header block once its blank-line terminator is buffered.
    /// Both `\r\n\r\n` and bare `\n\n` terminators occur in the wild; header
    /// lines are split on whichever separator ended the block.
    fn parse_header_block(&mut self) -> Result<Option<PendingHeader>> {
        let Some((block_end, sep)) = find_terminator(&self.buf) else {
            return Ok(None);
        };
        let header_len = block_end + 2 * sep.len();
        let block = std::str::from_utf8(&self.buf[..block_end])
            .map_err(|_| Error::Protocol("header block is not valid UTF-8".into()))?;

        let mut headers = HashMap::new();
        for line in block.split(sep) {
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Protocol(format!("malformed header line {line:?}")));
            };
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }

        let content_len = headers
            .get(CONTENT_LENGTH)
            .ok_or_else(|| Error::Protocol("message is missing Content-Length".into()))?
            .parse::<usize>()
            .map_err(|_| Error::Protocol("unreadable Content-Length".into()))?;

        Ok(Some(PendingHeader {
            header_len,
            content_len,
            headers,
        }))
    }
}

/// Finds the earliest header-block terminator. Returns the byte offset where
/// the block ends and the line separator in use.
fn find_terminator(buf: &[u8]) -> Option<(usize, &'static str)> {
    let crlf = find(buf, b"\r\n\r\n");
    let lf = find(buf, b"\n\n");
    match (crlf, lf) {
        (Some(c), Some(l)) if c < l => Some((c, "\r\n")),
        (Some(c), None) => Some((c, "\r\n")),
        (_, Some(l)) => Some((l, "\n")),
        (None, None) => None,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Frames a body with `Content-Length` plus any extra headers. The length is
/// always computed here from the body itself, so callers cannot desynchronize
/// the header from the payload.
pub fn encode(body: &[u8], extra_headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 64);
    out.extend_from_slice(format!("{CONTENT_LENGTH}: {}\r\n", body.len()).as_bytes());
    for (key, value) in extra_headers {
        out.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

//! # Line Codec
//!
//! Tokio codec that frames the device byte stream into text lines.
//!
//! ## Wire Format
//! ```text
//! inbound:  <text> ("\r\n" | "\n")
//! outbound: <text> "\r\n"
//! ```
//!
//! Lines longer than the configured limit are discarded up to the next
//! newline and surfaced as [`InboundLine::Overlong`], so one runaway line never
//! ends the stream or grows the buffer without bound. Bytes that are not UTF-8
//! (line noise on a serial link) are replaced, never rejected.

use crate::error::{BridgeError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound on the length of one inbound line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Line terminator written after every outbound line
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// One line read from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// Line content without its terminator
    Text(String),
    /// Line exceeded the length limit and was dropped
    Overlong { discarded: usize },
}

/// Newline-delimited codec with a maximum line length
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Offset up to which the buffer is known to hold no newline
    next_index: usize,
    /// Bytes dropped so far while skipping an overlong line
    discarding: Option<usize>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: None,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of a line body without a trailing `\r`
fn content_len(line: &[u8]) -> usize {
    match line.last() {
        Some(b'\r') => line.len() - 1,
        _ => line.len(),
    }
}

fn into_text(mut line: BytesMut) -> String {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    String::from_utf8_lossy(&line).into_owned()
}

impl Decoder for LineCodec {
    type Item = InboundLine;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let newline = src[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| offset + self.next_index);

        match (self.discarding, newline) {
            (Some(discarded), Some(idx)) => {
                src.advance(idx + 1);
                self.discarding = None;
                self.next_index = 0;
                Ok(Some(InboundLine::Overlong {
                    discarded: discarded + idx,
                }))
            }
            (Some(discarded), None) => {
                let n = src.len();
                src.advance(n);
                self.discarding = Some(discarded + n);
                self.next_index = 0;
                Ok(None)
            }
            (None, Some(idx)) => {
                self.next_index = 0;
                if content_len(&src[..idx]) > self.max_length {
                    src.advance(idx + 1);
                    return Ok(Some(InboundLine::Overlong { discarded: idx }));
                }
                let mut line = src.split_to(idx + 1);
                line.truncate(idx);
                Ok(Some(InboundLine::Text(into_text(line))))
            }
            (None, None) => {
                // one spare byte for the '\r' of a CRLF terminator still in flight
                if src.len() > self.max_length + 1 {
                    self.discarding = Some(src.len());
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if let Some(discarded) = self.discarding.take() {
            src.clear();
            return Ok(Some(InboundLine::Overlong { discarded }));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let line = src.split_to(src.len());
        if content_len(&line) > self.max_length {
            return Ok(Some(InboundLine::Overlong {
                discarded: line.len(),
            }));
        }
        Ok(Some(InboundLine::Text(into_text(line))))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = BridgeError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<()> {
        let line = line.as_ref();
        dst.reserve(line.len() + LINE_TERMINATOR.len());
        dst.put_slice(line.as_bytes());
        dst.put_slice(LINE_TERMINATOR);
        Ok(())
    }
}

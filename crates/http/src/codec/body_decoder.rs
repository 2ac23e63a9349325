//! Decoders for the request body, selected from the head's framing.
//!
//! Three framings exist in HTTP/1.1: none, `Content-Length`, and chunked
//! transfer encoding. All three emit the same stream shape: zero or more
//! [`PayloadItem::Chunk`] fragments followed by a single [`PayloadItem::Eof`].
//! Chunked trailers are consumed and discarded (pass-through only).

use std::cmp;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Unified body decoder dispatching on the framing kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn fixed_length(length: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(length)) }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(length) => Self::fixed_length(length),
            PayloadSize::Chunked => Self::chunked(),
            PayloadSize::Empty => Self::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

/// Decoder for bodies framed by `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    fn new(remaining: u64) -> Self {
        Self { remaining }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let take = cmp::min(self.remaining, src.len() as u64) as usize;
        let bytes = src.split_to(take).freeze();
        self.remaining -= take as u64;
        trace!(len = take, remaining = self.remaining, "read length-framed bytes");
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

/// Decoder for chunked transfer encoding (RFC 9112 section 7.1).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkedDecoder {
    state: ChunkedState,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Reading the hex chunk size
    Size,
    /// Skipping a chunk extension
    Extension,
    /// Expecting LF after the size line
    SizeLf,
    /// Reading chunk data
    Data,
    /// Expecting CR after chunk data
    DataCr,
    /// Expecting LF after chunk data
    DataLf,
    /// At the start of a trailer line
    Trailer,
    /// Inside a trailer line, discarding it
    TrailerLine,
    /// Expecting the final LF
    EndLf,
    /// Message finished
    End,
}

impl ChunkedDecoder {
    fn new() -> Self {
        Self { state: ChunkedState::Size, remaining: 0 }
    }

    fn step(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        use ChunkedState::*;
        Ok(match self.state {
            Size => match byte {
                b'0'..=b'9' => self.push_hex_digit(byte - b'0')?,
                b'a'..=b'f' => self.push_hex_digit(byte - b'a' + 10)?,
                b'A'..=b'F' => self.push_hex_digit(byte - b'A' + 10)?,
                b';' => Extension,
                b'\r' => SizeLf,
                _ => return Err(ParseError::invalid_chunk("unexpected byte in chunk size")),
            },
            Extension => {
                if byte == b'\r' {
                    SizeLf
                } else {
                    Extension
                }
            }
            SizeLf => match byte {
                b'\n' if self.remaining == 0 => Trailer,
                b'\n' => Data,
                _ => return Err(ParseError::invalid_chunk("missing LF after chunk size")),
            },
            DataCr => {
                if byte == b'\r' {
                    DataLf
                } else {
                    return Err(ParseError::invalid_chunk("missing CR after chunk data"));
                }
            }
            DataLf => {
                if byte == b'\n' {
                    Size
                } else {
                    return Err(ParseError::invalid_chunk("missing LF after chunk data"));
                }
            }
            Trailer => {
                if byte == b'\r' {
                    EndLf
                } else {
                    TrailerLine
                }
            }
            TrailerLine => {
                if byte == b'\n' {
                    Trailer
                } else {
                    TrailerLine
                }
            }
            EndLf => {
                if byte == b'\n' {
                    End
                } else {
                    return Err(ParseError::invalid_chunk("missing final LF"));
                }
            }
            Data | End => unreachable!("handled before byte stepping"),
        })
    }

    fn push_hex_digit(&mut self, digit: u8) -> Result<ChunkedState, ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_chunk("chunk size overflow"))?;
        Ok(ChunkedState::Size)
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => return Ok(Some(PayloadItem::Eof)),

                ChunkedState::Data => {
                    if self.remaining == 0 {
                        self.state = ChunkedState::DataCr;
                        continue;
                    }
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = cmp::min(self.remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(take).freeze();
                    self.remaining -= take as u64;
                    trace!(len = take, "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                _ => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.step(byte)?;
                }
            }
        }
    }
}

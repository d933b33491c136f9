//! Decoder for `Transfer-Encoding: chunked` request bodies.
//!
//! See [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//! Chunk extensions and trailer fields are read and discarded.

use std::io;
use std::io::ErrorKind;
use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::SizeStart, remaining: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// first hex digit of the chunk size
    SizeStart,
    /// further hex digits of the chunk size
    Size,
    /// whitespace between the size and the line end
    SizeLws,
    /// `;name=value` after the size
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::End {
                trace!("finished reading chunked body");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            if self.state == State::Body {
                let bytes = self.read_body(src);
                trace!(len = bytes.len(), "read chunk bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            self.state = match self.step(src) {
                Poll::Ready(Ok(state)) => state,
                Poll::Ready(Err(e)) => return Err(ParseError::invalid_body(e)),
                Poll::Pending => return Ok(None),
            };
        }
    }
}

fn invalid(msg: &'static str) -> Poll<Result<State, io::Error>> {
    Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, msg)))
}

impl ChunkedDecoder {
    fn read_body(&mut self, src: &mut BytesMut) -> Bytes {
        let available = src.len() as u64;
        let len = self.remaining.min(available) as usize;
        self.remaining -= len as u64;
        if self.remaining == 0 {
            self.state = State::BodyCr;
        }
        src.split_to(len).freeze()
    }

    /// Consumes one byte and moves the state machine forward.
    fn step(&mut self, src: &mut BytesMut) -> Poll<Result<State, io::Error>> {
        use State::*;

        if !src.has_remaining() {
            return Poll::Pending;
        }
        let byte = src.get_u8();

        match (self.state, byte) {
            (SizeStart | Size, b) if b.is_ascii_hexdigit() => {
                let digit = (b as char).to_digit(16).unwrap_or_default() as u64;
                match self.remaining.checked_mul(16).and_then(|size| size.checked_add(digit)) {
                    Some(size) => {
                        self.remaining = size;
                        Poll::Ready(Ok(Size))
                    }
                    None => invalid("chunk size overflow"),
                }
            }
            (SizeStart, _) => invalid("chunk size has no hex digit"),
            (Size | SizeLws, b'\t' | b' ') => Poll::Ready(Ok(SizeLws)),
            (Size | SizeLws, b';') => Poll::Ready(Ok(Extension)),
            (Size | SizeLws | Extension, b'\r') => Poll::Ready(Ok(SizeLf)),
            (Size, _) => invalid("invalid chunk size"),
            (SizeLws, _) => invalid("invalid whitespace after chunk size"),

            (Extension, b'\n') => invalid("chunk extension contains a bare LF"),
            (Extension, _) => Poll::Ready(Ok(Extension)),

            (SizeLf, b'\n') if self.remaining == 0 => Poll::Ready(Ok(EndCr)),
            (SizeLf, b'\n') => Poll::Ready(Ok(Body)),
            (SizeLf, _) => invalid("invalid chunk size line end"),

            (BodyCr, b'\r') => Poll::Ready(Ok(BodyLf)),
            (BodyCr, _) => invalid("missing CR after chunk data"),
            (BodyLf, b'\n') => Poll::Ready(Ok(SizeStart)),
            (BodyLf, _) => invalid("missing LF after chunk data"),

            (Trailer, b'\r') => Poll::Ready(Ok(TrailerLf)),
            (Trailer, _) => Poll::Ready(Ok(Trailer)),
            (TrailerLf, b'\n') => Poll::Ready(Ok(EndCr)),
            (TrailerLf, _) => invalid("invalid trailer line end"),

            (EndCr, b'\r') => Poll::Ready(Ok(EndLf)),
            (EndCr, _) => Poll::Ready(Ok(Trailer)),
            (EndLf, b'\n') => Poll::Ready(Ok(End)),
            (EndLf, _) => invalid("invalid chunked body end"),

            (Body | End, _) => Poll::Ready(Ok(self.state)),
        }
    }
}

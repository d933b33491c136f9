//! Encoder for bodies framed by `Content-Length`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining() as u64;
                if len > self.remaining {
                    warn!(len, remaining = self.remaining, "body is longer than its content-length");
                    return Err(SendError::invalid_body("body exceeds the declared content-length"));
                }
                self.remaining -= len;
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                Ok(())
            }
            PayloadItem::Eof if self.remaining > 0 => {
                warn!(remaining = self.remaining, "body is shorter than its content-length");
                Err(SendError::invalid_body("body ended before the declared content-length"))
            }
            PayloadItem::Eof => {
                self.eof = true;
                Ok(())
            }
        }
    }
}

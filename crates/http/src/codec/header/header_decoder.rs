//! Request head decoding.
//!
//! Parses the request line and header block with `httparse`, converts it into a
//! [`RequestHeader`] and works out how the payload that follows is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header block size: 8KB
//! - HTTP/1.0 and HTTP/1.1 only

use std::mem::MaybeUninit;

use bytes::{Buf, BytesMut};
use http::{HeaderValue, header};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

const MAX_HEADER_NUM: usize = 64;

const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Shortest possible request head: `GET / HTTP/1.1\r\n\r\n` minus the path byte.
const MIN_REQUEST_BYTES: usize = 14;

/// Decodes a request head into a [`RequestHeader`] and the [`PayloadSize`] of its body.
#[derive(Debug)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_REQUEST_BYTES {
            return Ok(None);
        }

        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let status = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e),
        })?;

        match status {
            Status::Complete(body_offset) => {
                trace!(header_size = body_offset, "parsed request head");
                ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

                let header = RequestHeader::try_from(req)?;
                let payload_size = parse_payload(&header)?;

                src.advance(body_offset);
                Ok(Some((header, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Works out the body framing from `Transfer-Encoding` and `Content-Length`.
///
/// The framing is decided for every method so that a stray body on a GET is
/// consumed instead of being read as the next request.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length
    let te_header = header.headers().get(header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::new_empty()),

        (Some(te_value), None) => {
            if is_chunked(Some(te_value)) {
                Ok(PayloadSize::new_chunked())
            } else {
                Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(te_value.as_bytes())))
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;

            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            match length {
                0 => Ok(PayloadSize::new_empty()),
                n => Ok(PayloadSize::new_length(n)),
            }
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present in headers"))
        }
    }
}

/// Chunked must be the final transfer coding for the framing to be chunked.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

//! Response head encoding.
//!
//! Writes the status line and header block, then adds the framing header that
//! matches the [`PayloadSize`] of the body to follow.

use std::io;
use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, StatusCode, Version, header};
use tokio_util::codec::Encoder;
use tracing::{error, warn};

use crate::protocol::{PayloadSize, ReasonPhrase, ResponseHead, SendError};

const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encodes a [`ResponseHead`] with the framing header for its payload.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        let status = head.status();
        let canonical = status.canonical_reason().unwrap_or_default();
        let custom = head.extensions_mut().remove::<ReasonPhrase>();
        let reason = match custom.as_ref().map(|phrase| phrase.as_str().trim()) {
            Some(phrase) if is_valid_reason(phrase) => phrase,
            Some(phrase) => {
                warn!(status = status.as_u16(), ?phrase, "reason phrase contains control characters, using the canonical one");
                canonical
            }
            None => canonical,
        };

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), reason)?;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            PayloadSize::Empty if forbids_content_length(status) => {
                headers.remove(header::CONTENT_LENGTH);
            }
            PayloadSize::Empty => {
                const ZERO: HeaderValue = HeaderValue::from_static("0");
                headers.insert(header::CONTENT_LENGTH, ZERO);
            }
        }

        for (name, value) in headers.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `reason-phrase = *( HTAB / SP / VCHAR / obs-text )`
fn is_valid_reason(phrase: &str) -> bool {
    phrase.bytes().all(|b| b == b'\t' || b == b' ' || b.is_ascii_graphic() || b >= 0x80)
}

/// Informational, 204 and 304 responses never carry a `Content-Length`.
fn forbids_content_length(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn status_line_and_length() {
        let head = Response::builder().status(StatusCode::OK).header("Server", "troika").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Length(5));

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("server: troika\r\n"));
        assert!(encoded.contains("content-length: 5\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn custom_reason_phrase() {
        let mut head = Response::builder().status(StatusCode::IM_A_TEAPOT).body(()).unwrap();
        head.extensions_mut().insert(ReasonPhrase::new("Short And Stout"));
        let encoded = encode(head, PayloadSize::Empty);

        assert!(encoded.starts_with("HTTP/1.1 418 Short And Stout\r\n"));
        assert!(encoded.contains("content-length: 0\r\n"));
    }

    #[test]
    fn reason_phrase_with_line_breaks_is_replaced() {
        let mut head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        head.extensions_mut().insert(ReasonPhrase::new("OK\r\nSet-Cookie: pwned=1"));
        let encoded = encode(head, PayloadSize::Empty);

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n"));
        assert!(!encoded.contains("Set-Cookie"));

        let mut head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();
        head.extensions_mut().insert(ReasonPhrase::new("Gone\u{0}Away"));
        assert!(encode(head, PayloadSize::Empty).starts_with("HTTP/1.1 404 Not Found\r\n"));

        let mut head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        head.extensions_mut().insert(ReasonPhrase::new("Très\tBien"));
        assert!(encode(head, PayloadSize::Empty).starts_with("HTTP/1.1 200 Très\tBien\r\n"));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let head = Response::builder().status(599).body(()).unwrap();
        assert!(encode(head, PayloadSize::Empty).starts_with("HTTP/1.1 599 \r\n"));
    }

    #[test]
    fn http10_status_line() {
        let head = Response::builder().version(Version::HTTP_10).status(StatusCode::NOT_FOUND).body(()).unwrap();
        assert!(encode(head, PayloadSize::Empty).starts_with("HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn no_content_has_no_length() {
        let head = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        let encoded = encode(head, PayloadSize::Empty);
        assert!(!encoded.contains("content-length"));

        let head = Response::builder().status(StatusCode::NOT_MODIFIED).body(()).unwrap();
        assert!(!encode(head, PayloadSize::Empty).contains("content-length"));

        let head = Response::builder().status(StatusCode::CONTINUE).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[test]
    fn chunked_replaces_length() {
        let head = Response::builder().header(header::CONTENT_LENGTH, "10").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Chunked);
        assert!(encoded.contains("transfer-encoding: chunked\r\n"));
        assert!(!encoded.contains("content-length"));
    }
}

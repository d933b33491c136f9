//! Response body compression.
//!
//! Bodies are buffered, so the whole body goes through one encoder at once.
//! The coding is picked from `Accept-Encoding` in client preference order;
//! `*` stands for the first coding the server supports.

use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::{HeaderValue, StatusCode, header};
use tracing::{trace, warn};
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::negotiation::parse_accept_encoding;
use crate::response::HttpResponse;

/// Server preference, used for `*`.
const SUPPORTED: [&str; 4] = ["zstd", "br", "gzip", "deflate"];

/// Collects compressed output.
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    fn new(coding: &str) -> io::Result<Option<Self>> {
        let encoder = match coding {
            "gzip" => Self::Gzip(GzEncoder::new(Writer::new(), Compression::best())),
            "deflate" => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::best())),
            "zstd" => Self::Zstd(ZstdEncoder::new(Writer::new(), 6)?),
            "br" => Self::Br(Box::new(brotli::CompressorWriter::new(
                Writer::new(),
                32 * 1024, // 32 KiB buffer
                3,         // BROTLI_PARAM_QUALITY
                22,        // BROTLI_PARAM_LGWIN
            ))),
            _ => return Ok(None),
        };
        Ok(Some(encoder))
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        let writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
            Self::Br(mut encoder) => {
                encoder.flush()?;
                encoder.into_inner()
            }
        };
        Ok(writer.buf.freeze())
    }
}

/// The coding to use for a request's `Accept-Encoding`, if any.
fn select(accept_encoding: &str) -> Option<&'static str> {
    parse_accept_encoding(accept_encoding).iter().find_map(|coding| match coding.as_str() {
        "*" => SUPPORTED.first().copied(),
        coding => SUPPORTED.iter().find(|supported| **supported == coding).copied(),
    })
}

fn encode(coding: &str, body: &[u8]) -> io::Result<Option<Bytes>> {
    let Some(mut encoder) = Encoder::new(coding)? else {
        return Ok(None);
    };
    encoder.write(body)?;
    encoder.finish().map(Some)
}

/// Compresses the body of `response` for a client sending `accept_encoding`.
///
/// Empty bodies, 204/304 responses and responses that already carry a
/// `Content-Encoding` are left alone, as is the body when encoding fails.
pub(crate) fn compress(accept_encoding: &str, response: &mut HttpResponse) {
    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return;
    }
    if response.body().is_empty() || response.headers().contains_key(header::CONTENT_ENCODING) {
        return;
    }
    let Some(coding) = select(accept_encoding) else {
        return;
    };

    match encode(coding, response.body()) {
        Ok(Some(encoded)) => {
            trace!(coding, before = response.body().len(), after = encoded.len(), "compressed response body");
            response.replace_body(encoded);
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(coding));
            headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }
        Ok(None) => {}
        Err(e) => warn!(coding, cause = %e, "failed to compress response body"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn response(body: &[u8]) -> HttpResponse {
        let mut response =
            HttpResponse::new(HeaderValue::from_static("troika-http/test"), HeaderValue::from_static("text/plain"));
        response.write(body);
        response
    }

    #[test]
    fn picks_client_preference() {
        assert_eq!(select("gzip, br"), Some("gzip"));
        assert_eq!(select("gzip;q=0.5, br"), Some("br"));
        assert_eq!(select("identity, deflate"), Some("deflate"));
        assert_eq!(select("*"), Some("zstd"));
        assert_eq!(select("identity"), None);
        assert_eq!(select("gzip;q=0"), None);
    }

    #[test]
    fn gzip_round_trip() {
        let body = "troika ".repeat(200);
        let mut response = response(body.as_bytes());

        compress("gzip", &mut response);

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        let mut decoded = String::new();
        GzDecoder::new(response.body()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn every_coding_produces_output() {
        for coding in SUPPORTED {
            let encoded = encode(coding, b"hello hello hello hello").unwrap().unwrap();
            assert!(!encoded.is_empty(), "{coding}");
        }
        assert!(encode("compress", b"hello").unwrap().is_none());
    }

    #[test]
    fn leaves_some_responses_alone() {
        let mut empty = response(b"");
        compress("gzip", &mut empty);
        assert!(!empty.headers().contains_key(header::CONTENT_ENCODING));

        let mut no_content = response(b"ignored");
        no_content.set_status(StatusCode::NO_CONTENT, None);
        compress("gzip", &mut no_content);
        assert_eq!(no_content.body(), b"ignored");

        let mut encoded = response(b"already");
        encoded.headers_mut().insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));
        compress("gzip", &mut encoded);
        assert_eq!(encoded.body(), b"already");

        let mut unsupported = response(b"plain");
        compress("compress", &mut unsupported);
        assert_eq!(unsupported.body(), b"plain");
    }
}

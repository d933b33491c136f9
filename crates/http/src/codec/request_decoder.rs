//! Request decoding: a head, then the body of that request, then the next head.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

/// Decodes a stream of pipelined requests.
///
/// While `payload_decoder` is `Some` the decoder is inside a body; it goes back to
/// reading heads once that body's [`PayloadItem::Eof`] has been yielded.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            if matches!(item, Some(PayloadItem::Eof)) {
                self.payload_decoder = None;
            }
            return Ok(item.map(Message::Payload));
        }

        Ok(self.header_decoder.decode(src)?.map(|(header, payload_size)| {
            self.payload_decoder = Some(payload_size.into());
            Message::Header((header, payload_size))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn next(decoder: &mut RequestDecoder, buf: &mut BytesMut) -> Message<(RequestHeader, PayloadSize)> {
        decoder.decode(buf).unwrap().unwrap()
    }

    #[test]
    fn pipelined_requests() {
        let mut buf = BytesMut::from(
            "POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\nPOST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nz\r\n0\r\n\r\n",
        );
        let mut decoder = RequestDecoder::new();

        let Message::Header((header, size)) = next(&mut decoder, &mut buf) else { panic!("expect header") };
        assert_eq!(header.uri().path(), "/a");
        assert_eq!(size, PayloadSize::Length(3));
        assert_eq!(next(&mut decoder, &mut buf).into_payload_item(), Some(PayloadItem::Chunk("abc".into())));
        assert_eq!(next(&mut decoder, &mut buf).into_payload_item(), Some(PayloadItem::Eof));

        let Message::Header((header, size)) = next(&mut decoder, &mut buf) else { panic!("expect header") };
        assert_eq!(header.method(), &Method::GET);
        assert!(size.is_empty());
        assert_eq!(next(&mut decoder, &mut buf).into_payload_item(), Some(PayloadItem::Eof));

        let Message::Header((header, size)) = next(&mut decoder, &mut buf) else { panic!("expect header") };
        assert_eq!(header.uri().path(), "/c");
        assert!(size.is_chunked());
        assert_eq!(next(&mut decoder, &mut buf).into_payload_item(), Some(PayloadItem::Chunk("z".into())));
        assert_eq!(next(&mut decoder, &mut buf).into_payload_item(), Some(PayloadItem::Eof));

        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }
}

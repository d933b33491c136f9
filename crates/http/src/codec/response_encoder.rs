//! Response encoding: a head, then payload items until `Eof`.

use std::io;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, OmitBody, PayloadSize, ResponseHead, SendError};

#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                // interim responses such as 100 Continue have no body to follow
                if !head.status().is_informational() {
                    let payload_encoder = match head.extensions().get::<OmitBody>() {
                        Some(_) => PayloadEncoder::empty(),
                        None => payload_size.into(),
                    };
                    self.payload_encoder = Some(payload_encoder);
                }
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder = None;
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{Response, StatusCode};

    type Item = Message<(ResponseHead, PayloadSize), Bytes>;

    fn head(status: StatusCode) -> ResponseHead {
        Response::builder().status(status).body(()).unwrap()
    }

    #[test]
    fn head_then_body() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Item::Header((head(StatusCode::OK), PayloadSize::Length(2))), &mut dst).unwrap();
        encoder.encode(Item::Payload(PayloadItem::Chunk(Bytes::from_static(b"ok"))), &mut dst).unwrap();
        encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");
    }

    #[test]
    fn interim_response_needs_no_eof() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Item::Header((head(StatusCode::CONTINUE), PayloadSize::Empty)), &mut dst).unwrap();
        encoder.encode(Item::Header((head(StatusCode::NO_CONTENT), PayloadSize::Empty)), &mut dst).unwrap();
        encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn head_response_keeps_length_without_body() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let mut response = head(StatusCode::OK);
        response.extensions_mut().insert(OmitBody);
        encoder.encode(Item::Header((response, PayloadSize::Length(5))), &mut dst).unwrap();
        assert!(encoder.encode(Item::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), &mut dst).is_err());
        encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\n");
    }

    #[test]
    fn out_of_order_items() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        assert!(encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).is_err());

        encoder.encode(Item::Header((head(StatusCode::OK), PayloadSize::Chunked)), &mut dst).unwrap();
        assert!(encoder.encode(Item::Header((head(StatusCode::OK), PayloadSize::Chunked)), &mut dst).is_err());
    }
}

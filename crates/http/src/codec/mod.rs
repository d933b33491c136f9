//! `tokio-util` codecs for the HTTP/1.x wire format.
//!
//! [`RequestDecoder`] yields a [`Message::Header`](crate::protocol::Message::Header) for each
//! request head, followed by the payload items of its body, always terminated by
//! [`PayloadItem::Eof`](crate::protocol::PayloadItem::Eof). [`ResponseEncoder`] accepts the same
//! shape in the other direction.
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use troika_http::codec::RequestDecoder;
//! use troika_http::protocol::{Message, PayloadItem};
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi");
//!
//! let head = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(head.is_header());
//!
//! let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(chunk.into_payload_item(), Some(PayloadItem::Chunk("hi".into())));
//!
//! let eof = decoder.decode(&mut buffer).unwrap();
//! assert!(matches!(eof, Some(Message::Payload(PayloadItem::Eof))));
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;

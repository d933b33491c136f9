use bytes::{Buf, Bytes};
use http_body::SizeHint;

/// A unit produced by the request decoder or consumed by the response encoder:
/// either the message head or a piece of its payload.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The message head, usually paired with its [`PayloadSize`]
    Header(T),
    /// A chunk of payload data or the end-of-payload marker
    Payload(PayloadItem<Data>),
}

/// An item of a payload stream.
///
/// Every payload, including an empty one, ends with exactly one [`PayloadItem::Eof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How a payload is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Framed by a `Content-Length` of the given size
    Length(u64),
    /// Framed by `Transfer-Encoding: chunked`
    Chunked,
    /// No payload at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        PayloadSize::Length(length)
    }

    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => PayloadSize::new_empty(),
            Some(length) => PayloadSize::new_length(length),
            None => PayloadSize::new_chunked(),
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns the payload item, or `None` for a header message.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_from_size_hint() {
        assert_eq!(PayloadSize::from(SizeHint::with_exact(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::from(SizeHint::with_exact(12)), PayloadSize::Length(12));
        assert_eq!(PayloadSize::from(SizeHint::new()), PayloadSize::Chunked);
    }

    #[test]
    fn size_hint_from_payload_size() {
        assert_eq!(SizeHint::from(PayloadSize::Length(3)).exact(), Some(3));
        assert_eq!(SizeHint::from(PayloadSize::Empty).exact(), Some(0));
        assert_eq!(SizeHint::from(PayloadSize::Chunked).exact(), None);
    }
}

//! Protocol types shared by the codec and connection layers.
//!
//! - [`message`]: [`Message`], [`PayloadItem`] and [`PayloadSize`], the units flowing
//!   through the decoder and encoder
//! - [`request`]: [`RequestHeader`] plus the [`PeerAddr`] request extension
//! - [`response`]: [`ResponseHead`] plus the [`ReasonPhrase`] response extension
//! - [`body`]: the streaming request body handed to handlers
//! - [`error`]: [`HttpError`], [`ParseError`] and [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::PeerAddr;
pub use request::RequestHeader;

mod response;
pub use response::OmitBody;
pub use response::ReasonPhrase;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;

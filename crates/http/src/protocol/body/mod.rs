//! The streaming request body.
//!
//! A request body is produced on the connection task and consumed by the handler.
//! The two halves are linked by a pair of channels:
//!
//! - [`ReqBody`] implements `http_body::Body`. Each poll for a frame sends a
//!   request signal and then waits for the answer on the data channel, so at most
//!   one chunk is in flight.
//! - [`ReqBodySender`] owns a borrow of the decoder stream. It answers every
//!   signal with the next payload item and, once the handler is done, drains
//!   whatever the handler left unread so the next request starts on a clean
//!   boundary.

mod req_body;

pub use req_body::ReqBody;
pub use req_body::ReqBodySender;

//! Per-connection request processing.
//!
//! [`HttpConnection`] reads request heads off the wire, hands each request to a
//! [`Handler`](crate::handler::Handler) together with a streaming body, and writes
//! the response back. It keeps the connection alive between requests unless the
//! client asks otherwise, answers `Expect: 100-continue`, and drains whatever part
//! of a request body the handler did not read.

mod http_connection;

pub use http_connection::HttpConnection;

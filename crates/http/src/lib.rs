//! The HTTP/1.1 wire layer of troika.
//!
//! This crate turns a pair of async byte streams into a sequence of
//! `http::Request`s and writes the matching `http::Response`s back. It knows
//! nothing about routing or handlers beyond the [`handler::Handler`] seam:
//! the application layer (`troika-web`) plugs in there.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 request parsing backed by `httparse`
//! - Content-Length and chunked request bodies, streamed through [`protocol::body::ReqBody`]
//! - Keep-alive connections, honouring `Connection: close`
//! - `Expect: 100-continue`
//! - Fixed-length and chunked responses chosen from the body size hint
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response, StatusCode};
//! use http_body_util::{BodyExt, Full};
//! use bytes::Bytes;
//! use std::error::Error;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use troika_http::connection::HttpConnection;
//! use troika_http::handler::make_handler;
//! use troika_http::protocol::body::ReqBody;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(echo));
//!
//!     loop {
//!         let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer).with_peer_addr(remote_addr);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!("service has error, cause {}, connection shutdown", e);
//!             }
//!         });
//!     }
//! }
//!
//! async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), "echo");
//!     let body = request.into_body().collect().await?.to_bytes();
//!     Ok(Response::builder().status(StatusCode::OK).body(Full::new(body))?)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the per-connection state machine
//! - [`protocol`]: message, header and error types shared by the other modules
//! - [`codec`]: `tokio-util` decoder/encoder pairs for the wire format
//! - [`handler`]: the request handler seam
//!
//! # Limitations
//!
//! - HTTP/1.x only, no TLS
//! - Maximum header block size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;

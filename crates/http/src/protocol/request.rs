//! The request head as produced by the decoder.
//!
//! [`RequestHeader`] wraps an `http::Request<()>` and answers the two questions
//! the connection loop keeps asking: does this request carry a body, and may
//! the connection be reused once it is answered.

use std::net::SocketAddr;

use http::{HeaderMap, Method, Request, Uri, Version, header};

use crate::protocol::ParseError;

/// The parsed head of an HTTP request, without its body.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

/// The address of the client on the other end of the connection.
///
/// Stored in the request extensions by the connection when it knows the peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl RequestHeader {
    /// Attaches a body, turning the head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the method is one that may carry a body.
    ///
    /// GET, HEAD, DELETE, OPTIONS and CONNECT bodies are not read.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the connection may serve another request after this one.
    ///
    /// HTTP/1.1 is persistent unless the client sent `Connection: close`;
    /// HTTP/1.0 is persistent only with an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers()
                .get_all(header::CONNECTION)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|value| value.trim().eq_ignore_ascii_case(token))
        };

        match self.version() {
            Version::HTTP_11 => !has_token("close"),
            Version::HTTP_10 => has_token("keep-alive"),
            _ => false,
        }
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn expect_continue(&self) -> bool {
        self.version() == Version::HTTP_11
            && self
                .headers()
                .get(header::EXPECT)
                .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }
}

impl<'headers, 'buf> TryFrom<httparse::Request<'headers, 'buf>> for RequestHeader {
    type Error = ParseError;

    fn try_from(req: httparse::Request<'headers, 'buf>) -> Result<Self, Self::Error> {
        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;

        let path = req.path.ok_or(ParseError::InvalidUri)?;
        let uri = Uri::try_from(path).map_err(|_| ParseError::InvalidUri)?;

        let version = match req.version {
            Some(1) => Version::HTTP_11,
            Some(0) => Version::HTTP_10,
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = header::HeaderName::from_bytes(h.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = header::HeaderValue::from_bytes(h.value).map_err(ParseError::invalid_header)?;
            headers.append(name, value);
        }

        let mut inner = Request::new(());
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;
        *inner.version_mut() = version;
        *inner.headers_mut() = headers;

        Ok(RequestHeader { inner })
    }
}

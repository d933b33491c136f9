//! The buffered response a handler builds up.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, Response, StatusCode, Version, header};
use http_body_util::Full;
use troika_http::protocol::ReasonPhrase;

use crate::date;

#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    phrase: Option<String>,
    headers: HeaderMap,
    body: BytesMut,
    server: HeaderValue,
    default_content_type: HeaderValue,
}

impl HttpResponse {
    /// A `200 OK` with the default `Server`, `Content-Type` and `Date` headers.
    pub fn new(server: HeaderValue, default_content_type: HeaderValue) -> Self {
        let mut response = Self {
            status: StatusCode::OK,
            phrase: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            server,
            default_content_type,
        };
        response.reset_headers();
        response
    }

    fn reset_headers(&mut self) {
        self.headers.clear();
        self.headers.insert(header::SERVER, self.server.clone());
        self.headers.insert(header::CONTENT_TYPE, self.default_content_type.clone());
        self.headers.insert(header::DATE, date::http_date());
    }

    /// Back to a `200 OK` with default headers and no body.
    pub fn clear(&mut self) {
        self.status = StatusCode::OK;
        self.phrase = None;
        self.body.clear();
        self.reset_headers();
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status. Without a phrase the canonical one is sent.
    pub fn set_status(&mut self, status: StatusCode, phrase: Option<String>) {
        self.status = status;
        self.phrase = phrase;
    }

    pub fn phrase(&self) -> Option<&str> {
        self.phrase.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub(crate) fn replace_body(&mut self, body: Bytes) {
        self.body = BytesMut::from(&body[..]);
    }

    /// The `http::Response` to hand to the connection.
    pub fn into_response(self, version: Version) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.version_mut() = version;
        *response.headers_mut() = self.headers;
        if let Some(phrase) = self.phrase {
            response.extensions_mut().insert(ReasonPhrase::new(phrase));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> HttpResponse {
        HttpResponse::new(HeaderValue::from_static("troika-http/0.1.0"), HeaderValue::from_static("text/html; charset=UTF-8"))
    }

    #[test]
    fn default_headers() {
        let response = response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], "troika-http/0.1.0");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=UTF-8");
        assert!(response.headers().contains_key(header::DATE));
        assert!(response.body().is_empty());
    }

    #[test]
    fn clear_restores_defaults() {
        let mut response = response();
        response.set_status(StatusCode::IM_A_TEAPOT, Some("Short And Stout".to_string()));
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.headers_mut().insert(header::LOCATION, HeaderValue::from_static("/elsewhere"));
        response.write(b"body");

        response.clear();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.phrase(), None);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=UTF-8");
        assert!(!response.headers().contains_key(header::LOCATION));
        assert!(response.body().is_empty());
    }

    #[test]
    fn into_response_carries_phrase_and_version() {
        let mut response = response();
        response.set_status(StatusCode::IM_A_TEAPOT, Some("Short And Stout".to_string()));
        response.write(b"tea");

        let response = response.into_response(Version::HTTP_10);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.extensions().get::<ReasonPhrase>().unwrap().as_str(), "Short And Stout");
    }
}

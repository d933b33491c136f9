//! Per-request state shared by the lifecycle methods of a handler.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{self, AsHeaderName};
use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use mime::Mime;
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::application::Application;
use crate::compress;
use crate::error::{HandlerResult, HttpError, ResponseError};
use crate::negotiation::{parse_accept, parse_accept_encoding, parse_accept_language, parse_content_type};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::route::{Route, RouteMatch};
use crate::settings::Settings;
use crate::transcoder::Chunk;

/// Everything a [`RequestHandler`](crate::RequestHandler) works with while
/// serving one request: the request, the response being built, the matched
/// route and the application.
///
/// Negotiated values and the decoded body are computed on first use and
/// cached for the rest of the request.
#[derive(Debug)]
pub struct RequestContext<'app> {
    application: &'app Application,
    route: &'app Route,
    args: Vec<String>,
    kwargs: HashMap<String, String>,
    request: HttpRequest,
    response: HttpResponse,
    response_content_type: OnceCell<Mime>,
    body_arguments: OnceCell<Option<Value>>,
    request_language: OnceCell<String>,
    request_encoding: OnceCell<String>,
}

impl<'app> RequestContext<'app> {
    pub(crate) fn new(application: &'app Application, matched: RouteMatch<'app>, request: HttpRequest) -> Self {
        let response = application.new_response();
        Self {
            application,
            route: matched.route,
            args: matched.args,
            kwargs: matched.kwargs,
            request,
            response,
            response_content_type: OnceCell::new(),
            body_arguments: OnceCell::new(),
            request_language: OnceCell::new(),
            request_encoding: OnceCell::new(),
        }
    }

    pub fn application(&self) -> &'app Application {
        self.application
    }

    pub fn settings(&self) -> &'app Settings {
        self.application.settings()
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn route(&self) -> &'app Route {
        self.route
    }

    /// What the unnamed groups of the route pattern captured, in order.
    pub fn path_args(&self) -> &[String] {
        &self.args
    }

    pub fn path_kwarg(&self, name: &str) -> Option<&str> {
        self.kwargs.get(name).map(String::as_str)
    }

    pub fn path_kwargs(&self) -> &HashMap<String, String> {
        &self.kwargs
    }

    /// The route name, or the handler's name for unnamed routes.
    pub fn name(&self) -> &'app str {
        self.route.route_name().unwrap_or_else(|| self.route.handler().name())
    }

    /// `METHOD uri (remote_ip)`
    pub fn request_summary(&self) -> String {
        self.request.summary()
    }

    /// Resets the response status, headers and body.
    pub fn clear(&mut self) {
        self.response.clear();
    }

    pub fn clear_header(&mut self, name: impl AsHeaderName) {
        self.response.headers_mut().remove(name);
    }

    /// Sets a response header, replacing any previous value.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), ResponseError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(Into::<http::Error>::into)?;
        let value = HeaderValue::try_from(value).map_err(Into::<http::Error>::into)?;
        self.response.headers_mut().insert(name, value);
        Ok(())
    }

    pub fn get_status(&self) -> StatusCode {
        self.response.status()
    }

    /// Sets the response status, with a custom reason phrase if given.
    pub fn set_status(&mut self, status: StatusCode, phrase: Option<&str>) {
        self.response.set_status(status, phrase.map(str::to_string));
    }

    /// Appends to the response body.
    ///
    /// Values are serialized with the transcoder for
    /// [`response_content_type`](Self::response_content_type), which also
    /// sets the `Content-Type` header.
    pub fn write(&mut self, chunk: impl Into<Chunk>) -> Result<(), ResponseError> {
        if self.is_finished() {
            return Err(ResponseError::AlreadyFinished);
        }

        match chunk.into() {
            Chunk::Bytes(bytes) => self.response.write(&bytes),
            Chunk::Text(text) => self.response.write(text.as_bytes()),
            Chunk::Value(value) => {
                let content_type = self.response_content_type();
                let Some(transcoder) = self.application.transcoders().get(content_type) else {
                    return Err(ResponseError::NoTranscoder { content_type: content_type.to_string() });
                };
                let (content_type, bytes) = transcoder.to_bytes(&value)?;
                self.set_header(header::CONTENT_TYPE, content_type)?;
                self.response.write(&bytes);
            }
        }
        Ok(())
    }

    /// Marks the response complete. Nothing can be written afterwards.
    pub fn finish(&mut self) -> Result<(), ResponseError> {
        if self.is_finished() {
            return Err(ResponseError::AlreadyFinished);
        }
        self.request.mark_finished();
        Ok(())
    }

    /// Writes `chunk`, then finishes.
    pub fn finish_with(&mut self, chunk: impl Into<Chunk>) -> Result<(), ResponseError> {
        self.write(chunk)?;
        self.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.request.is_finished()
    }

    /// Redirects to `url` and finishes.
    ///
    /// The status is `status` when given, otherwise 301 for permanent
    /// redirects and 302 for the rest.
    pub fn redirect(&mut self, url: &str, permanent: bool, status: Option<StatusCode>) -> Result<(), ResponseError> {
        let status = status.unwrap_or(if permanent { StatusCode::MOVED_PERMANENTLY } else { StatusCode::FOUND });
        self.set_status(status, None);
        self.set_header(header::LOCATION, url)?;
        self.finish()
    }

    /// Fails with a 503 unless the setting is present and truthy.
    pub fn require_setting(&self, name: &str) -> HandlerResult {
        if self.settings().is_set(name) {
            return Ok(());
        }
        error!(setting = name, handler = self.name(), "missing required setting");
        Err(HttpError::new(StatusCode::SERVICE_UNAVAILABLE).into())
    }

    /// Renders an error response through the handler's `write_error`.
    pub async fn send_error(&mut self, status: StatusCode, reason: Option<&str>, message: Option<&str>) -> HandlerResult {
        let mut error = HttpError::new(status);
        if let Some(reason) = reason {
            error = error.with_phrase(reason);
        }
        if let Some(message) = message {
            error = error.with_description(message);
        }

        let handler = self.route.handler();
        handler.write_error(self, &error, &[]).await
    }

    /// The request body decoded with the transcoder for its `Content-Type`.
    ///
    /// `None` when the body is empty or the `Content-Type` is missing or
    /// malformed. A type without a transcoder is a 415, a body the transcoder
    /// rejects a 400.
    pub fn get_body_arguments(&self) -> HandlerResult<Option<&Value>> {
        self.body_arguments.get_or_try_init(|| self.decode_body()).map(Option::as_ref)
    }

    fn decode_body(&self) -> HandlerResult<Option<Value>> {
        if self.request.body().is_empty() {
            return Ok(None);
        }
        let Some(content_type) = self.request.header(header::CONTENT_TYPE).and_then(parse_content_type) else {
            return Ok(None);
        };
        let Some(transcoder) = self.application.transcoders().get(&content_type) else {
            let description = format!("cannot decode a Content-Type of {content_type}");
            return Err(HttpError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE).with_description(description).into());
        };

        match transcoder.from_bytes(self.request.body()) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(cause = %e, "rejected request body");
                Err(HttpError::new(StatusCode::BAD_REQUEST).with_description(e.to_string()).into())
            }
        }
    }

    /// The last value of a query argument.
    pub fn get_query_argument(&self, name: &str) -> Option<&str> {
        self.get_query_arguments(name).last().map(String::as_str)
    }

    pub fn get_query_arguments(&self, name: &str) -> &[String] {
        self.request.query_arguments().get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// The client's preferred language, or the `default_language` setting.
    pub fn get_request_language(&self) -> &str {
        self.request_language.get_or_init(|| {
            self.request
                .header(header::ACCEPT_LANGUAGE)
                .and_then(|value| parse_accept_language(value).into_iter().next())
                .unwrap_or_else(|| self.settings().default_language.clone())
        })
    }

    /// The client's preferred content coding, or the `default_encoding` setting.
    pub fn get_request_encoding(&self) -> &str {
        self.request_encoding.get_or_init(|| {
            self.request
                .header(header::ACCEPT_ENCODING)
                .and_then(|value| parse_accept_encoding(value).into_iter().next())
                .unwrap_or_else(|| self.settings().default_encoding.clone())
        })
    }

    /// The media type to respond with, negotiated from `Accept` against the
    /// registered transcoders.
    ///
    /// A missing `Accept`, `*/*`, or no acceptable transcoder all fall back to
    /// the `default_content_type` setting.
    pub fn response_content_type(&self) -> &Mime {
        self.response_content_type.get_or_init(|| {
            let default = self.application.default_content_type();
            let accept = match self.request.header(header::ACCEPT) {
                Some(accept) if accept.trim() != "*/*" => accept,
                _ => return default.clone(),
            };

            match self.application.transcoders().select(&parse_accept(accept)) {
                Some((mime, _)) => mime.clone(),
                None => default.clone(),
            }
        })
    }

    /// The built-in error response.
    ///
    /// Clears the response, then renders an HTML page when the negotiated
    /// type is `text/html` and an object in the negotiated type otherwise.
    /// `traceback` is only shown when `serve_traceback` is on.
    pub fn write_default_error(&mut self, error: &HttpError, traceback: &[String]) -> Result<(), ResponseError> {
        self.clear();
        self.set_status(error.status(), error.has_custom_phrase().then(|| error.phrase()));

        let traceback: &[String] = if self.settings().serve_traceback { traceback } else { &[] };
        let content_type = self.response_content_type().clone();
        debug!(%content_type, status = error.status().as_u16(), "writing error response");

        if content_type.essence_str() == mime::TEXT_HTML.essence_str() {
            self.set_header(header::CONTENT_TYPE, content_type.as_ref())?;
            self.finish_with(render_error_page(error, &traceback.join("\n")))
        } else {
            self.finish_with(json!({
                "status_code": error.status().as_u16(),
                "exception": "HttpError",
                "phrase": error.phrase(),
                "description": error.description(),
                "traceback": traceback,
            }))
        }
    }

    pub(crate) fn mark_finished(&mut self) {
        self.request.mark_finished();
    }

    pub(crate) fn into_response(mut self) -> Response<Full<Bytes>> {
        if self.settings().compress_response {
            if let Some(accept_encoding) = self.request.header(header::ACCEPT_ENCODING) {
                compress::compress(accept_encoding, &mut self.response);
            }
        }
        self.response.into_response(self.request.version())
    }
}

fn render_error_page(error: &HttpError, traceback: &str) -> String {
    let status = error.status().as_u16();
    let phrase = htmlescape::encode_minimal(error.phrase());
    let description = htmlescape::encode_minimal(error.description());
    let traceback = htmlescape::encode_minimal(traceback);
    format!(
        "<html>\n  <head><title>{status}: {phrase}</title></head>\n  <body>\n    <h1>{status}: {phrase}</h1>\n    \
         <p>{description}</p>\n    <pre>{traceback}</pre>\n  </body>\n</html>\n"
    )
}

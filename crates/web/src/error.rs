//! Errors raised while handling a request.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::transcoder::TranscodeError;

/// What a handler lifecycle method returns.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// An error that is answered with a specific HTTP status.
///
/// The phrase defaults to the canonical reason of the status and the
/// description to a short explanation of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    phrase: Option<String>,
    description: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        Self { status, phrase: None, description: None }
    }

    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = Some(phrase.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn phrase(&self) -> &str {
        self.phrase.as_deref().or_else(|| self.status.canonical_reason()).unwrap_or_default()
    }

    /// `true` when the phrase was given explicitly.
    pub fn has_custom_phrase(&self) -> bool {
        self.phrase.is_some()
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| describe(self.status))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.phrase())
    }
}

impl StdError for HttpError {}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        Self::new(status)
    }
}

/// How a lifecycle method stopped.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Answer with this status through `write_error`.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Stop processing; the response written so far is sent as is.
    #[error("request finished early")]
    Finish,

    /// Anything else; logged and answered with a 500.
    #[error(transparent)]
    Internal(Box<dyn StdError + Send + Sync>),
}

impl HandlerError {
    pub fn internal<E: Into<Box<dyn StdError + Send + Sync>>>(error: E) -> Self {
        Self::Internal(error.into())
    }
}

impl From<ResponseError> for HandlerError {
    fn from(error: ResponseError) -> Self {
        Self::Internal(Box::new(error))
    }
}

impl From<StatusCode> for HandlerError {
    fn from(status: StatusCode) -> Self {
        Self::Http(HttpError::new(status))
    }
}

/// Misuse of the response through a [`RequestContext`](crate::RequestContext).
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("request is already finished")]
    AlreadyFinished,

    #[error("no transcoder registered for {content_type}")]
    NoTranscoder { content_type: String },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("invalid header: {0}")]
    InvalidHeader(#[from] http::Error),
}

/// Short explanations of each status, shown on error pages.
fn describe(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100 => "Request received, please continue",
        101 => "Switching to new protocol; obey Upgrade header",
        200 => "Request fulfilled, document follows",
        201 => "Document created, URL follows",
        202 => "Request accepted, processing continues off-line",
        203 => "Request fulfilled from cache",
        204 => "Request fulfilled, nothing follows",
        205 => "Clear input form for further input",
        206 => "Partial content follows",
        300 => "Object has several resources -- see URI list",
        301 | 308 => "Object moved permanently -- see URI list",
        302 | 307 => "Object moved temporarily -- see URI list",
        303 => "Object moved -- see Method and URL list",
        304 => "Document has not changed since given time",
        305 => "You must use proxy specified in Location to access this resource",
        400 => "Bad request syntax or unsupported method",
        401 => "No permission -- see authorization schemes",
        402 => "No payment -- see charging schemes",
        403 => "Request forbidden -- authorization will not help",
        404 => "Nothing matches the given URI",
        405 => "Specified method is invalid for this resource",
        406 => "URI not available in preferred format",
        407 => "You must authenticate with this proxy before proceeding",
        408 => "Request timed out; try again later",
        409 => "Request conflict",
        410 => "URI no longer exists and has been permanently removed",
        411 => "Client must specify Content-Length",
        412 => "Precondition in headers is false",
        413 => "Entity is too large",
        414 => "URI is too long",
        415 => "Entity body in unsupported format",
        416 => "Cannot satisfy request range",
        417 => "Expect condition could not be satisfied",
        421 => "Server is not able to produce a response",
        428 => "The origin server requires the request to be conditional",
        429 => "The user has sent too many requests in a given amount of time",
        431 => "The server is unwilling to process the request because its header fields are too large",
        451 => "The server is denying access to the resource as a consequence of a legal demand",
        500 => "Server got itself in trouble",
        501 => "Server does not support this operation",
        502 => "Invalid responses from another server/proxy",
        503 => "The server cannot process the request due to a high load",
        504 => "The gateway server did not receive a timely response",
        505 => "Cannot fulfill request",
        511 => "The client needs to authenticate to gain network access",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_the_status() {
        let error = HttpError::new(StatusCode::NOT_FOUND);
        assert_eq!(error.phrase(), "Not Found");
        assert_eq!(error.description(), "Nothing matches the given URI");
        assert!(!error.has_custom_phrase());
        assert_eq!(error.to_string(), "404 Not Found");
    }

    #[test]
    fn explicit_values_win() {
        let error = HttpError::new(StatusCode::IM_A_TEAPOT).with_phrase("Short And Stout").with_description("tip me over");
        assert_eq!(error.phrase(), "Short And Stout");
        assert_eq!(error.description(), "tip me over");
        assert_eq!(error.to_string(), "418 Short And Stout");
    }

    #[test]
    fn unknown_status_has_blank_text() {
        let error = HttpError::new(StatusCode::from_u16(599).unwrap());
        assert_eq!(error.phrase(), "");
        assert_eq!(error.description(), "");
    }

    #[test]
    fn conversions() {
        assert!(matches!(HandlerError::from(StatusCode::FORBIDDEN), HandlerError::Http(e) if e.status() == StatusCode::FORBIDDEN));
        assert!(matches!(HandlerError::from(ResponseError::AlreadyFinished), HandlerError::Internal(_)));
    }
}

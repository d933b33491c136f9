//! The response head written by the encoder.

use http::Response;

/// The header portion of a response; the body travels separately as payload items.
pub type ResponseHead = Response<()>;

/// A custom reason phrase for the status line.
///
/// When present in the response extensions the encoder writes it instead of the
/// canonical reason of the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonPhrase(pub String);

impl ReasonPhrase {
    pub fn new<S: Into<String>>(phrase: S) -> Self {
        Self(phrase.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Marks a response to a `HEAD` request.
///
/// The framing headers still describe the body a `GET` would get, but the
/// encoder expects no body bytes after the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmitBody;

//! Conversions between response/request bodies and [`serde_json::Value`]s.
//!
//! A [`Transcoder`] serializes a value into the bytes of one media type and
//! back. The [`Transcoders`] registry keeps them in registration order, which
//! is also the server's preference order during content negotiation.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::negotiation::{self, MediaRange};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("{content_type} cannot represent {kind}")]
    Unsupported { content_type: String, kind: &'static str },

    #[error("failed to encode {content_type}: {source}")]
    Encode { content_type: String, source: BoxError },

    #[error("failed to decode {content_type}: {source}")]
    Decode { content_type: String, source: BoxError },
}

impl TranscodeError {
    fn unsupported(content_type: &str, value: &Value) -> Self {
        let kind = match value {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        };
        Self::Unsupported { content_type: content_type.to_string(), kind }
    }

    fn encode(content_type: &str, source: impl Into<BoxError>) -> Self {
        Self::Encode { content_type: content_type.to_string(), source: source.into() }
    }

    fn decode(content_type: &str, source: impl Into<BoxError>) -> Self {
        Self::Decode { content_type: content_type.to_string(), source: source.into() }
    }
}

/// Serializes values to and from one media type.
#[cfg_attr(test, mockall::automock)]
pub trait Transcoder: Send + Sync {
    /// The media type this transcoder produces, e.g. `application/json`.
    fn content_type(&self) -> &str;

    /// Returns the full `Content-Type` value to send and the encoded body.
    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError>;

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError>;
}

/// What a handler writes to the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// Written as is.
    Bytes(Bytes),
    /// Written as UTF-8.
    Text(String),
    /// Serialized with the transcoder negotiated for the response.
    Value(Value),
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for Chunk {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Renders a value as plain text: strings verbatim, everything else as JSON.
fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn charset_content_type(mime: &str) -> String {
    format!("{mime}; charset=\"UTF-8\"")
}

/// `text/*` bodies, decoded to a string value.
#[derive(Debug, Clone)]
pub struct Text {
    mime: String,
}

impl Text {
    pub fn new(mime: impl Into<String>) -> Self {
        Self { mime: mime.into() }
    }

    pub fn plain() -> Self {
        Self::new(mime::TEXT_PLAIN.essence_str())
    }

    pub fn html() -> Self {
        Self::new(mime::TEXT_HTML.essence_str())
    }
}

impl Transcoder for Text {
    fn content_type(&self) -> &str {
        &self.mime
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        Ok((charset_content_type(&self.mime), Bytes::from(to_text(value))))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        let text = std::str::from_utf8(data).map_err(|e| TranscodeError::decode(&self.mime, e))?;
        Ok(Value::String(text.to_string()))
    }
}

/// `application/octet-stream`: strings or arrays of bytes in, arrays of bytes out.
#[derive(Debug, Clone, Default)]
pub struct Binary;

impl Transcoder for Binary {
    fn content_type(&self) -> &str {
        "application/octet-stream"
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let bytes = match value {
            Value::String(s) => Bytes::from(s.clone()),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Bytes::from)
                .ok_or_else(|| TranscodeError::unsupported(self.content_type(), value))?,
            other => return Err(TranscodeError::unsupported(self.content_type(), other)),
        };
        Ok((self.content_type().to_string(), bytes))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        Ok(Value::Array(data.iter().map(|b| Value::from(*b)).collect()))
    }
}

/// `application/x-www-form-urlencoded` for flat objects.
///
/// Keys are written sorted and arrays as repeated keys. Decoding collapses
/// keys with a single value and drops blank values.
#[derive(Debug, Clone, Default)]
pub struct FormUrlEncoded;

impl Transcoder for FormUrlEncoded {
    fn content_type(&self) -> &str {
        "application/x-www-form-urlencoded"
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let Value::Object(map) = value else {
            return Err(TranscodeError::unsupported(self.content_type(), value));
        };

        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();

        let mut pairs: Vec<(&str, String)> = Vec::with_capacity(map.len());
        for key in keys {
            match &map[key] {
                Value::Null => {}
                Value::Array(items) => {
                    pairs.extend(items.iter().filter(|item| !item.is_null()).map(|item| (key.as_str(), to_text(item))));
                }
                other => pairs.push((key.as_str(), to_text(other))),
            }
        }

        let encoded = serde_urlencoded::to_string(&pairs).map_err(|e| TranscodeError::encode(self.content_type(), e))?;
        Ok((charset_content_type(self.content_type()), Bytes::from(encoded)))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(data).map_err(|e| TranscodeError::decode(self.content_type(), e))?;

        let mut map = Map::new();
        for (key, value) in pairs.into_iter().filter(|(_, value)| !value.is_empty()) {
            match map.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(Value::String(value));
                }
                Entry::Occupied(mut entry) => match entry.get_mut() {
                    Value::Array(values) => values.push(Value::String(value)),
                    existing => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, Value::String(value)]);
                    }
                },
            }
        }
        Ok(Value::Object(map))
    }
}

/// `application/json` with compact separators.
#[derive(Debug, Clone, Default)]
pub struct Json;

impl Transcoder for Json {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let bytes = serde_json::to_vec(value).map_err(|e| TranscodeError::encode(self.content_type(), e))?;
        Ok((charset_content_type(self.content_type()), Bytes::from(bytes)))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        serde_json::from_slice(data).map_err(|e| TranscodeError::decode(self.content_type(), e))
    }
}

/// `application/msgpack`.
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Default)]
pub struct MessagePack;

#[cfg(feature = "msgpack")]
impl Transcoder for MessagePack {
    fn content_type(&self) -> &str {
        "application/msgpack"
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let bytes = rmp_serde::to_vec(value).map_err(|e| TranscodeError::encode(self.content_type(), e))?;
        Ok((self.content_type().to_string(), Bytes::from(bytes)))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        rmp_serde::from_slice(data).map_err(|e| TranscodeError::decode(self.content_type(), e))
    }
}

/// `text/x-yaml`.
#[cfg(feature = "yaml")]
#[derive(Debug, Clone, Default)]
pub struct Yaml;

#[cfg(feature = "yaml")]
impl Transcoder for Yaml {
    fn content_type(&self) -> &str {
        "text/x-yaml"
    }

    fn to_bytes(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let text = serde_yaml::to_string(value).map_err(|e| TranscodeError::encode(self.content_type(), e))?;
        Ok((charset_content_type(self.content_type()), Bytes::from(text)))
    }

    fn from_bytes(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        serde_yaml::from_slice(data).map_err(|e| TranscodeError::decode(self.content_type(), e))
    }
}

/// Transcoders keyed by media type, in server preference order.
#[derive(Clone, Default)]
pub struct Transcoders {
    mimes: Vec<Mime>,
    transcoders: Vec<Arc<dyn Transcoder>>,
}

impl Transcoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// `text/html`, `text/plain`, octet-stream, form, JSON, then MessagePack
    /// and YAML when their features are enabled.
    pub fn with_defaults() -> Self {
        let mut transcoders = Self::new();
        transcoders.insert(mime::TEXT_HTML, Arc::new(Text::html()));
        transcoders.insert(mime::TEXT_PLAIN, Arc::new(Text::plain()));
        transcoders.insert(mime::APPLICATION_OCTET_STREAM, Arc::new(Binary));
        transcoders.insert(mime::APPLICATION_WWW_FORM_URLENCODED, Arc::new(FormUrlEncoded));
        transcoders.insert(mime::APPLICATION_JSON, Arc::new(Json));
        #[cfg(feature = "msgpack")]
        {
            let mime: Mime = "application/msgpack".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM);
            transcoders.insert(mime, Arc::new(MessagePack));
        }
        #[cfg(feature = "yaml")]
        {
            let mime: Mime = "text/x-yaml".parse().unwrap_or(mime::TEXT_PLAIN);
            transcoders.insert(mime, Arc::new(Yaml));
        }
        transcoders
    }

    /// Registers `transcoder` under `content_type`, or under its own content
    /// type when none is given. A type registered twice keeps its position
    /// and takes the new transcoder.
    pub fn add(&mut self, transcoder: Arc<dyn Transcoder>, content_type: Option<&str>) -> Result<(), mime::FromStrError> {
        let mime: Mime = content_type.unwrap_or_else(|| transcoder.content_type()).parse()?;
        self.insert(mime, transcoder);
        Ok(())
    }

    fn insert(&mut self, mime: Mime, transcoder: Arc<dyn Transcoder>) {
        match self.position(&mime) {
            Some(index) => self.transcoders[index] = transcoder,
            None => {
                self.mimes.push(mime);
                self.transcoders.push(transcoder);
            }
        }
    }

    fn position(&self, mime: &Mime) -> Option<usize> {
        self.mimes.iter().position(|registered| registered.essence_str() == mime.essence_str())
    }

    /// The transcoder registered for the essence of `mime`, ignoring parameters.
    pub fn get(&self, mime: &Mime) -> Option<&Arc<dyn Transcoder>> {
        self.position(mime).map(|index| &self.transcoders[index])
    }

    /// The registered media type the client prefers most, with its transcoder.
    pub fn select(&self, requested: &[MediaRange]) -> Option<(&Mime, &Arc<dyn Transcoder>)> {
        let mime = negotiation::select_content_type(requested, &self.mimes)?;
        self.get(mime).map(|transcoder| (mime, transcoder))
    }

    pub fn content_types(&self) -> &[Mime] {
        &self.mimes
    }
}

impl fmt::Debug for Transcoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.mimes.iter().map(Mime::essence_str)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::parse_accept;
    use serde_json::json;

    #[test]
    fn text_renders_strings_and_values() {
        let (content_type, bytes) = Text::html().to_bytes(&json!("<b>hi</b>")).unwrap();
        assert_eq!(content_type, "text/html; charset=\"UTF-8\"");
        assert_eq!(bytes, "<b>hi</b>");

        let (_, bytes) = Text::plain().to_bytes(&json!({"a": 1})).unwrap();
        assert_eq!(bytes, r#"{"a":1}"#);

        assert_eq!(Text::plain().from_bytes(b"hello").unwrap(), json!("hello"));
        assert!(Text::plain().from_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn binary_accepts_strings_and_byte_arrays() {
        assert_eq!(Binary.to_bytes(&json!("raw")).unwrap().1, "raw");
        assert_eq!(Binary.to_bytes(&json!([104, 105])).unwrap().1, "hi");
        assert!(matches!(Binary.to_bytes(&json!([1024])), Err(TranscodeError::Unsupported { .. })));
        assert!(matches!(Binary.to_bytes(&json!({"a": 1})), Err(TranscodeError::Unsupported { .. })));
        assert_eq!(Binary.from_bytes(b"hi").unwrap(), json!([104, 105]));
    }

    #[test]
    fn form_encoding_is_sorted_and_flat() {
        let value = json!({"b": "two words", "a": [1, 2], "skip": null, "c": true});
        let (content_type, bytes) = FormUrlEncoded.to_bytes(&value).unwrap();
        assert_eq!(content_type, "application/x-www-form-urlencoded; charset=\"UTF-8\"");
        assert_eq!(bytes, "a=1&a=2&b=two+words&c=true");

        assert!(FormUrlEncoded.to_bytes(&json!([1, 2])).is_err());
    }

    #[test]
    fn form_decoding_collapses_single_values() {
        let value = FormUrlEncoded.from_bytes(b"name=troika&tag=a&tag=b&blank=&tag=c").unwrap();
        assert_eq!(value, json!({"name": "troika", "tag": ["a", "b", "c"]}));
    }

    #[test]
    fn json_is_compact() {
        let (content_type, bytes) = Json.to_bytes(&json!({"a": [1, 2], "b": null})).unwrap();
        assert_eq!(content_type, "application/json; charset=\"UTF-8\"");
        assert_eq!(bytes, r#"{"a":[1,2],"b":null}"#);
        assert!(matches!(Json.from_bytes(b"{"), Err(TranscodeError::Decode { .. })));
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn msgpack_preserves_values() {
        let value = json!({"id": 7, "tags": ["a"], "ok": true});
        let (_, bytes) = MessagePack.to_bytes(&value).unwrap();
        assert_eq!(MessagePack.from_bytes(&bytes).unwrap(), value);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_reads_documents() {
        let value = Yaml.from_bytes(b"id: 7\ntags:\n  - a\n").unwrap();
        assert_eq!(value, json!({"id": 7, "tags": ["a"]}));
        assert!(Yaml.to_bytes(&value).unwrap().0.starts_with("text/x-yaml"));
    }

    #[test]
    fn registry_keeps_order_and_replaces_in_place() {
        let mut transcoders = Transcoders::with_defaults();
        let first: Vec<&str> = transcoders.content_types().iter().take(5).map(Mime::essence_str).collect();
        assert_eq!(
            first,
            ["text/html", "text/plain", "application/octet-stream", "application/x-www-form-urlencoded", "application/json"]
        );

        let mut custom = MockTranscoder::new();
        custom.expect_content_type().return_const("application/json".to_string());
        transcoders.add(Arc::new(custom), None).unwrap();

        assert_eq!(transcoders.content_types()[4].essence_str(), "application/json");
        let json: Mime = "application/json; charset=utf-8".parse().unwrap();
        assert_eq!(transcoders.get(&json).unwrap().content_type(), "application/json");
    }

    #[test]
    fn registry_under_explicit_type() {
        let mut transcoders = Transcoders::new();
        let mut custom = MockTranscoder::new();
        custom.expect_content_type().never();
        transcoders.add(Arc::new(custom), Some("application/vnd.troika+json")).unwrap();

        let (mime, _) = transcoders.select(&parse_accept("application/*")).unwrap();
        assert_eq!(mime.essence_str(), "application/vnd.troika+json");
        assert!(transcoders.add(Arc::new(Json), Some("nonsense")).is_err());
    }

    #[test]
    fn select_negotiates_against_registration_order() {
        let transcoders = Transcoders::with_defaults();
        let (mime, _) = transcoders.select(&parse_accept("application/json, text/*;q=0.5")).unwrap();
        assert_eq!(mime.essence_str(), "application/json");
        assert!(transcoders.select(&parse_accept("image/png")).is_none());
    }
}

//! Application configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Settings shared by every request of an [`Application`](crate::Application).
///
/// Every field has a default, so a partial document deserializes cleanly:
///
/// ```
/// use troika_web::Settings;
///
/// let settings: Settings = serde_json::from_str(r#"{"port": 8080, "api_key": "k"}"#).unwrap();
/// assert_eq!(settings.port, 8080);
/// assert_eq!(settings.host, "127.0.0.1");
/// assert_eq!(settings.get("api_key"), Some(serde_json::json!("k")));
/// ```
///
/// Keys that are not fields land in an open map read through [`Settings::get`]
/// and written through [`Settings::set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Compress response bodies the client accepts an encoding for.
    pub compress_response: bool,
    pub default_content_type: String,
    /// Route name of the catch-all 404 route.
    pub default_handler_name: String,
    pub default_handler_suppress_logs: bool,
    /// Include the error chain of uncaught handler errors in error pages.
    pub serve_traceback: bool,
    pub server_name: String,
    pub server_version: String,
    pub default_language: String,
    pub default_encoding: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            compress_response: false,
            default_content_type: "text/html; charset=UTF-8".to_string(),
            default_handler_name: "default".to_string(),
            default_handler_suppress_logs: false,
            serve_traceback: false,
            server_name: "troika-http".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            default_language: "en".to_string(),
            default_encoding: "identity".to_string(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Looks a setting up by name, fields first, then the open map.
    pub fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            "host" => Value::from(self.host.as_str()),
            "port" => Value::from(self.port),
            "compress_response" => Value::from(self.compress_response),
            "default_content_type" => Value::from(self.default_content_type.as_str()),
            "default_handler_name" => Value::from(self.default_handler_name.as_str()),
            "default_handler_suppress_logs" => Value::from(self.default_handler_suppress_logs),
            "serve_traceback" => Value::from(self.serve_traceback),
            "server_name" => Value::from(self.server_name.as_str()),
            "server_version" => Value::from(self.server_version.as_str()),
            "default_language" => Value::from(self.default_language.as_str()),
            "default_encoding" => Value::from(self.default_encoding.as_str()),
            _ => return self.extra.get(name).cloned(),
        };
        Some(value)
    }

    /// Stores a value in the open map.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// `true` when the setting exists and is not empty, zero, false or null.
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| is_truthy(&value))
    }

    pub(crate) fn server_header(&self) -> String {
        format!("{}/{}", self.server_name, self.server_version)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

//! The request as handlers see it: head, collected body and derived values.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, Method, Uri, Version, header};
use percent_encoding::percent_decode_str;
use troika_http::protocol::PeerAddr;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
static X_SCHEME: HeaderName = HeaderName::from_static("x-scheme");

#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path: String,
    query_arguments: HashMap<String, Vec<String>>,
    body: Bytes,
    remote_ip: Option<IpAddr>,
    protocol: String,
    host: Option<String>,
    start_time: Instant,
    finish_time: Option<Instant>,
}

impl HttpRequest {
    /// Builds the request from its head and fully collected body.
    ///
    /// The client address comes from the [`PeerAddr`] extension unless a
    /// proxy header names one: `X-Forwarded-For` (its last element), then
    /// `X-Real-Ip`. The protocol is `http` unless `X-Forwarded-Proto` or
    /// `X-Scheme` says otherwise.
    pub fn new(parts: Parts, body: Bytes) -> Self {
        let Parts { method, uri, version, headers, extensions, .. } = parts;

        let remote_ip = forwarded_ip(&headers).or_else(|| extensions.get::<PeerAddr>().map(|peer| peer.0.ip()));
        let protocol = [&X_FORWARDED_PROTO, &X_SCHEME]
            .into_iter()
            .find_map(|name| headers.get(name).and_then(|value| value.to_str().ok()))
            .map_or_else(|| "http".to_string(), |proto| proto.trim().to_string());
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.to_string()));

        let path = percent_decode_str(uri.path()).decode_utf8_lossy().into_owned();
        let query_arguments = parse_query(uri.query().unwrap_or_default());

        Self {
            method,
            uri,
            version,
            headers,
            path,
            query_arguments,
            body,
            remote_ip,
            protocol,
            host,
            start_time: Instant::now(),
            finish_time: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as sent.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, when present and visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The percent-decoded path, used for routing.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, empty when there is none.
    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    pub fn query_arguments(&self) -> &HashMap<String, Vec<String>> {
        &self.query_arguments
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// `protocol://host/uri`
    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host().unwrap_or_default(), self.uri)
    }

    /// Time since the request arrived, or until it finished.
    pub fn request_time(&self) -> Duration {
        self.finish_time.unwrap_or_else(Instant::now).duration_since(self.start_time)
    }

    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finish_time.get_or_insert_with(Instant::now);
    }

    /// `METHOD uri (remote_ip)`, as used in logs.
    pub fn summary(&self) -> String {
        match self.remote_ip {
            Some(ip) => format!("{} {} ({ip})", self.method, self.uri),
            None => format!("{} {} (-)", self.method, self.uri),
        }
    }
}

/// The last address of `X-Forwarded-For`, else of `X-Real-Ip`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let last_ip = |name: &HeaderName| -> Option<IpAddr> {
        let value = headers.get(name)?.to_str().ok()?;
        value.rsplit(',').next()?.trim().parse().ok()
    };

    last_ip(&X_FORWARDED_FOR).or_else(|| last_ip(&X_REAL_IP))
}

/// Multi-valued query arguments; blank values are dropped.
fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();

    let mut arguments: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in pairs.into_iter().filter(|(_, value)| !value.is_empty()) {
        arguments.entry(name).or_default().push(value);
    }
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn request(builder: http::request::Builder) -> HttpRequest {
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(PeerAddr("10.0.0.7:4321".parse().unwrap()));
        HttpRequest::new(parts, Bytes::new())
    }

    #[test]
    fn basic_fields() {
        let req = request(Request::get("/caf%C3%A9/menu?lang=fr&lang=en&empty=&page=2").header("Host", "example.com"));

        assert_eq!(req.path(), "/café/menu");
        assert_eq!(req.query(), "lang=fr&lang=en&empty=&page=2");
        assert_eq!(req.query_arguments()["lang"], ["fr", "en"]);
        assert_eq!(req.query_arguments()["page"], ["2"]);
        assert!(!req.query_arguments().contains_key("empty"));
        assert_eq!(req.remote_ip(), Some("10.0.0.7".parse().unwrap()));
        assert_eq!(req.protocol(), "http");
        assert_eq!(req.full_url(), "http://example.com/caf%C3%A9/menu?lang=fr&lang=en&empty=&page=2");
        assert_eq!(req.summary(), "GET /caf%C3%A9/menu?lang=fr&lang=en&empty=&page=2 (10.0.0.7)");
    }

    #[test]
    fn proxy_headers() {
        let req = request(
            Request::get("/")
                .header("X-Real-Ip", "192.168.1.1")
                .header("X-Forwarded-For", "203.0.113.9, 198.51.100.2")
                .header("X-Scheme", "ftp")
                .header("X-Forwarded-Proto", "https"),
        );
        assert_eq!(req.remote_ip(), Some("198.51.100.2".parse().unwrap()));
        assert_eq!(req.protocol(), "https");

        let req = request(Request::get("/").header("X-Forwarded-For", "not-an-ip").header("X-Real-Ip", "192.168.1.1"));
        assert_eq!(req.remote_ip(), Some("192.168.1.1".parse().unwrap()));

        let req = request(Request::get("/").header("X-Real-Ip", "192.0.2.4, 192.168.1.1"));
        assert_eq!(req.remote_ip(), Some("192.168.1.1".parse().unwrap()));

        let req = request(Request::get("/").header("X-Real-Ip", "garbage"));
        assert_eq!(req.remote_ip(), Some("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn request_time_stops_when_finished() {
        let mut req = request(Request::post("/"));
        assert!(!req.is_finished());
        req.mark_finished();
        let elapsed = req.request_time();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(req.request_time(), elapsed);
        assert!(req.is_finished());
    }
}

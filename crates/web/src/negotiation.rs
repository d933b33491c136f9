//! Proactive content negotiation.
//!
//! Parses the `Accept`, `Accept-Language` and `Accept-Encoding` request headers
//! and picks the best of the media types the server can produce, following
//! [RFC 9110 Section 12.5](https://www.rfc-editor.org/rfc/rfc9110#section-12.5).
//! Qualities are kept in thousandths so ranking never compares floats.

use std::cmp::Reverse;

use mime::Mime;

/// `q=1`, in thousandths.
pub const MAX_QUALITY: u16 = 1000;

/// One element of an `Accept` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    mime: Mime,
    quality: u16,
}

impl MediaRange {
    /// Parses `type/subtype;param=value;q=0.5`. Returns `None` for malformed
    /// ranges and out of range qualities.
    pub fn parse(value: &str) -> Option<Self> {
        let mime: Mime = value.trim().parse().ok()?;
        let quality = match mime.get_param("q") {
            Some(q) => parse_quality(q.as_str())?,
            None => MAX_QUALITY,
        };
        Some(Self { mime, quality })
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// Quality in thousandths, `0..=1000`.
    pub fn quality(&self) -> u16 {
        self.quality
    }

    /// `*/*` < `type/*` < `type/subtype` < `type/subtype;param=value`.
    pub fn specificity(&self) -> u8 {
        if self.mime.type_().as_str() == "*" {
            0
        } else if self.mime.subtype().as_str() == "*" {
            1
        } else {
            2 + u8::from(self.mime.params().any(|(name, _)| name.as_str() != "q"))
        }
    }

    /// Whether `candidate` falls in this range. Parameters only rank ranges,
    /// they never exclude a candidate.
    pub fn matches(&self, candidate: &Mime) -> bool {
        let type_ = self.mime.type_().as_str();
        let subtype = self.mime.subtype().as_str();
        (type_ == "*" || type_ == candidate.type_().as_str()) && (subtype == "*" || subtype == candidate.subtype().as_str())
    }
}

/// Parses an `Accept` header, most preferred range first.
///
/// Ranges are ordered by quality, then by specificity; equal ranges keep
/// their header order. Malformed elements are skipped.
pub fn parse_accept(value: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> =
        value.split(',').filter(|item| !item.trim().is_empty()).filter_map(MediaRange::parse).collect();
    ranges.sort_by_key(|range| Reverse((range.quality, range.specificity())));
    ranges
}

/// Parses a `Content-Type` header value.
pub fn parse_content_type(value: &str) -> Option<Mime> {
    value.trim().parse().ok()
}

/// Picks the media type from `available` that the client prefers most.
///
/// Every candidate is scored by the most specific range that matches it.
/// The highest quality wins, then the most specific match, then the earlier
/// candidate. A best match with `q=0` excludes the candidate.
pub fn select_content_type<'a>(requested: &[MediaRange], available: &'a [Mime]) -> Option<&'a Mime> {
    let mut best: Option<(&'a Mime, (u16, u8))> = None;

    for candidate in available {
        let Some(range) = requested.iter().filter(|range| range.matches(candidate)).max_by_key(|range| range.specificity())
        else {
            continue;
        };
        if range.quality == 0 {
            continue;
        }

        let score = (range.quality, range.specificity());
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(mime, _)| mime)
}

/// Parses an `Accept-Language` header, most preferred tag first. `q=0` tags
/// are dropped.
pub fn parse_accept_language(value: &str) -> Vec<String> {
    parse_weighted(value).into_iter().map(str::to_string).collect()
}

/// Parses an `Accept-Encoding` header into lowercase codings, most preferred
/// first. `q=0` codings are dropped.
pub fn parse_accept_encoding(value: &str) -> Vec<String> {
    parse_weighted(value).into_iter().map(str::to_ascii_lowercase).collect()
}

fn parse_weighted(value: &str) -> Vec<&str> {
    let mut entries: Vec<(&str, u16)> = value
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let token = parts.next()?.trim();
            if token.is_empty() {
                return None;
            }
            let quality = match parts.find_map(|param| {
                let (name, value) = param.split_once('=')?;
                name.trim().eq_ignore_ascii_case("q").then_some(value)
            }) {
                Some(q) => parse_quality(q)?,
                None => MAX_QUALITY,
            };
            (quality > 0).then_some((token, quality))
        })
        .collect();

    entries.sort_by_key(|(_, quality)| Reverse(*quality));
    entries.into_iter().map(|(token, _)| token).collect()
}

/// `qvalue = ( "0" [ "." 0*3DIGIT ] ) / ( "1" [ "." 0*3("0") ] )`
fn parse_quality(value: &str) -> Option<u16> {
    let value = value.trim().trim_matches('"');
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole = match whole {
        "0" => 0,
        "1" => MAX_QUALITY,
        _ => return None,
    };
    let fraction: u16 = format!("{fraction:0<3}").parse().ok()?;
    let quality = whole + fraction;
    (quality <= MAX_QUALITY).then_some(quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mimes(values: &[&str]) -> Vec<Mime> {
        values.iter().map(|value| value.parse().unwrap()).collect()
    }

    #[test]
    fn quality_values() {
        assert_eq!(parse_quality("1"), Some(1000));
        assert_eq!(parse_quality("0.5"), Some(500));
        assert_eq!(parse_quality("0.25"), Some(250));
        assert_eq!(parse_quality("0"), Some(0));
        assert_eq!(parse_quality("1.000"), Some(1000));
        assert_eq!(parse_quality("1.5"), None);
        assert_eq!(parse_quality("0.1234"), None);
        assert_eq!(parse_quality("high"), None);
    }

    #[test]
    fn accept_is_ordered_by_quality_then_specificity() {
        let ranges = parse_accept("*/*;q=0.1, text/*, application/json;q=0.9, text/html");
        let ordered: Vec<String> = ranges.iter().map(|range| range.mime().essence_str().to_string()).collect();
        assert_eq!(ordered, ["text/html", "text/*", "application/json", "*/*"]);
        assert_eq!(ranges[3].quality(), 100);
    }

    #[test]
    fn malformed_ranges_are_skipped() {
        let ranges = parse_accept("garbage, text/plain;q=2, application/json");
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].mime().essence_str(), "application/json");
    }

    #[test]
    fn select_prefers_quality() {
        let available = mimes(&["text/html", "application/json"]);
        let requested = parse_accept("text/html;q=0.5, application/json");
        assert_eq!(select_content_type(&requested, &available).unwrap().essence_str(), "application/json");
    }

    #[test]
    fn select_uses_server_order_for_ties() {
        let available = mimes(&["text/html", "text/plain", "application/json"]);
        let requested = parse_accept("*/*");
        assert_eq!(select_content_type(&requested, &available).unwrap().essence_str(), "text/html");

        let requested = parse_accept("text/*");
        assert_eq!(select_content_type(&requested, &available).unwrap().essence_str(), "text/html");
    }

    #[test]
    fn specific_range_overrides_wildcard() {
        let available = mimes(&["text/html", "application/json"]);
        let requested = parse_accept("*/*, text/html;q=0");
        assert_eq!(select_content_type(&requested, &available).unwrap().essence_str(), "application/json");
    }

    #[test]
    fn select_without_match() {
        let available = mimes(&["text/html", "application/json"]);
        assert!(select_content_type(&parse_accept("image/png"), &available).is_none());
        assert!(select_content_type(&[], &available).is_none());
    }

    #[test]
    fn content_type() {
        let mime = parse_content_type("application/json; charset=utf-8").unwrap();
        assert_eq!(mime.essence_str(), "application/json");
        assert!(parse_content_type("not a type").is_none());
    }

    #[test]
    fn languages_and_encodings() {
        assert_eq!(parse_accept_language("fr;q=0.8, en-US, de;q=0"), ["en-US", "fr"]);
        assert_eq!(parse_accept_encoding("gzip;q=0.5, BR, identity;q=0"), ["br", "gzip"]);
        assert!(parse_accept_encoding("").is_empty());
    }
}

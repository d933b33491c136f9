//! Cached value of the `Date` response header.
//!
//! Formatting an HTTP date on every response is wasteful when the value only
//! changes once a second, so the last rendered value is shared and refreshed
//! by whichever request first finds it stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

static CURRENT: Lazy<ArcSwap<(Instant, HeaderValue)>> = Lazy::new(|| ArcSwap::from_pointee((Instant::now(), render())));

/// The current date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub(crate) fn http_date() -> HeaderValue {
    let current = CURRENT.load();
    if current.0.elapsed() < REFRESH_INTERVAL {
        return current.1.clone();
    }

    let value = render();
    CURRENT.store(Arc::new((Instant::now(), value.clone())));
    value
}

fn render() -> HeaderValue {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    HeaderValue::from_maybe_shared(Bytes::from_owner(buf)).unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}

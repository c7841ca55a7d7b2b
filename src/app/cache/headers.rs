//! Response header parsing for cache metadata
//!
//! [`parse_cache_headers`] turns the headers of a response into a
//! [`CacheEntry`] skeleton (no body) whose TTLs follow these rules:
//!
//! - `Cache-Control` tokens are read left to right. `no-cache`, `no-store`,
//!   `must-revalidate` and `proxy-revalidate` set the max age to zero,
//!   `max-age=N` sets it to N seconds, non-numeric values are ignored.
//! - With `Cache-Control` present, both TTLs are `now + max_age`.
//! - Otherwise, if `Date` is valid and `Expires >= Date`, both TTLs are
//!   `now + (Expires - Date)`.
//! - Otherwise both TTLs are 0 and the entry is stale from the start.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};

use crate::app::models::Headers;

use super::entry::CacheEntry;

/// Build cache metadata from response headers at time `now` (epoch ms)
pub fn parse_cache_headers(headers: &Headers, now: i64) -> CacheEntry {
    let server_date = headers.get("Date").map(parse_date_as_epoch).unwrap_or(0);
    let server_expires = headers.get("Expires").map(parse_date_as_epoch).unwrap_or(0);

    let mut has_cache_control = false;
    let mut max_age: i64 = 0;
    if let Some(value) = headers.get("Cache-Control") {
        has_cache_control = true;
        for token in value.split(',').map(str::trim) {
            if token.eq_ignore_ascii_case("no-cache")
                || token.eq_ignore_ascii_case("no-store")
                || token.eq_ignore_ascii_case("must-revalidate")
                || token.eq_ignore_ascii_case("proxy-revalidate")
            {
                max_age = 0;
            } else if let Some(seconds) = strip_prefix_ignore_case(token, "max-age=") {
                if let Ok(seconds) = seconds.trim().parse::<u32>() {
                    max_age = i64::from(seconds);
                }
            }
        }
    }

    let ttl = if has_cache_control {
        now + max_age * 1000
    } else if server_date > 0 && server_expires >= server_date {
        now + (server_expires - server_date)
    } else {
        0
    };

    CacheEntry {
        data: Vec::new(),
        etag: headers.get("ETag").map(str::to_string),
        server_date,
        ttl,
        soft_ttl: ttl,
        headers: headers.clone(),
    }
}

/// Apply a caller-supplied freshness lifetime
///
/// The soft TTL becomes `now + timeout`; the hard TTL is raised so it never
/// expires before the soft one.
pub fn apply_cache_timeout(entry: &mut CacheEntry, timeout: Duration, now: i64) {
    let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX / 2);
    entry.soft_ttl = now.saturating_add(millis);
    entry.ttl = entry.ttl.max(entry.soft_ttl);
}

/// Parse an HTTP date (RFC 1123, RFC 850 or asctime) to epoch ms, 0 if invalid
pub fn parse_date_as_epoch(value: &str) -> i64 {
    parse_http_date(value).unwrap_or(0)
}

/// Parse an HTTP date to epoch milliseconds
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp_millis());
    }

    // RFC 850: Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(date.and_utc().timestamp_millis());
    }

    // asctime: Sun Nov  6 08:49:37 1994
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Ok(date) = NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y") {
        return Some(date.and_utc().timestamp_millis());
    }

    None
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

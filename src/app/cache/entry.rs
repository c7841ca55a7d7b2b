//! Cache entries and their on-disk encoding
//!
//! An entry file is laid out as:
//!
//! ```text
//! "HKC1" | u32 BE metadata length | metadata JSON | response body
//! ```
//!
//! The metadata records the key, the freshness timestamps, the ordered
//! response headers, and the length and MD5 of the body. Decoding checks all
//! of them, so a torn or foreign file is reported as corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::CacheKey;
use crate::app::models::Headers;
use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A cached HTTP response
///
/// All timestamps are epoch milliseconds. An entry is expired once the
/// current time passes either TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response body
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Validator for conditional requests
    pub etag: Option<String>,
    /// Server `Date` header, 0 when absent
    pub server_date: i64,
    /// Server-imposed expiry
    pub ttl: i64,
    /// Client-side expiry; equals `ttl` unless overridden
    pub soft_ttl: i64,
    /// Response headers in arrival order
    pub headers: Headers,
}

impl CacheEntry {
    /// True once `now` is past either TTL
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.ttl || now > self.soft_ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Validators to send when revalidating this entry
    pub fn conditional_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(etag) = &self.etag {
            headers.set("If-None-Match", etag.clone());
        }
        if self.server_date > 0 {
            if let Some(date) = DateTime::<Utc>::from_timestamp_millis(self.server_date) {
                headers.set(
                    "If-Modified-Since",
                    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                );
            }
        }
        headers
    }

    /// Serialize into the entry file format
    pub fn encode(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
        let metadata = EntryMetadata {
            key: key.to_hex(),
            entry: self.clone(),
            data_len: self.data.len() as u64,
            data_md5: format!("{:x}", md5::compute(&self.data)),
        };
        let json = serde_json::to_vec(&metadata)?;
        let json_len = u32::try_from(json.len()).map_err(|_| CacheError::Corruption {
            reason: "metadata block too large".to_string(),
        })?;

        let mut out = Vec::with_capacity(8 + json.len() + self.data.len());
        out.extend_from_slice(cache::ENTRY_MAGIC);
        out.extend_from_slice(&json_len.to_be_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Parse an entry file, verifying it belongs to `key` and is intact
    pub fn decode(key: &CacheKey, bytes: &[u8]) -> CacheResult<Self> {
        let corrupt = |reason: &str| CacheError::Corruption {
            reason: format!("{key}: {reason}"),
        };

        if bytes.len() < 8 || &bytes[..4] != cache::ENTRY_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let json_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let body_start = 8usize
            .checked_add(json_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| corrupt("truncated metadata"))?;

        let metadata: EntryMetadata =
            serde_json::from_slice(&bytes[8..body_start]).map_err(|e| corrupt(&e.to_string()))?;
        if metadata.key != key.to_hex() {
            return Err(corrupt("key mismatch"));
        }

        let data = &bytes[body_start..];
        if data.len() as u64 != metadata.data_len {
            return Err(corrupt("body length mismatch"));
        }
        if format!("{:x}", md5::compute(data)) != metadata.data_md5 {
            return Err(corrupt("body checksum mismatch"));
        }

        let mut entry = metadata.entry;
        entry.data = data.to_vec();
        Ok(entry)
    }
}

#[derive(Serialize, Deserialize)]
struct EntryMetadata {
    key: String,
    #[serde(flatten)]
    entry: CacheEntry,
    data_len: u64,
    data_md5: String,
}

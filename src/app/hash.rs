//! Cache key type
//!
//! A [`CacheKey`] is the MD5 digest of a request's effective URL. It names the
//! disk-cache slot for the response and identifies the in-flight dedup group
//! in the request coordinator. Keys are stored as their raw 16-byte digest and
//! rendered as lowercase hex for file names and journal lines.

use std::fmt;
use std::str::FromStr;

use crate::errors::{CacheError, CacheResult};

/// MD5 digest of a request URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    /// Derive the key for a URL
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use httpkit::app::CacheKey;
    ///
    /// let key = CacheKey::for_url("https://example.com/a?b=1");
    /// assert_eq!(key.to_hex().len(), 32);
    /// ```
    pub fn for_url(url: &str) -> Self {
        CacheKey(md5::compute(url.as_bytes()).0)
    }

    /// Parse a key from its 32-character hex form (case insensitive)
    pub fn from_hex(hex: &str) -> CacheResult<Self> {
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::Corruption {
                reason: format!("invalid cache key: {hex}"),
            });
        }

        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let high = hex_value(chunk[0]);
            let low = hex_value(chunk[1]);
            bytes[i] = (high << 4) | low;
        }

        Ok(CacheKey(bytes))
    }

    /// Lowercase 32-character hex representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(32), |mut acc, b| {
            let _ = write!(&mut acc, "{:02x}", b);
            acc
        })
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

//! Data models for httpkit
//!
//! This module defines the logical [`Request`] submitted by callers together
//! with the small value types it is built from: methods, priorities, ordered
//! header maps, bodies and proxies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::hash::CacheKey;
use crate::constants::{http, limits, priority};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Immediate,
}

impl Priority {
    /// Integer priority consumed by the worker pool queue
    pub fn value(&self) -> i32 {
        match self {
            Priority::Low => priority::LOW,
            Priority::Normal => priority::NORMAL,
            Priority::High => priority::HIGH,
            Priority::Immediate => priority::IMMEDIATE,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "immediate" => Ok(Priority::Immediate),
            other => Err(format!(
                "unknown priority '{other}' (expected low, normal, high or immediate)"
            )),
        }
    }
}

/// Ordered, case-preserving header map
///
/// Lookups are case-insensitive and return the last value for a name, which
/// matches how repeated response headers are resolved when building cache
/// metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any existing values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace all values for `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    /// Last value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` onto `self`: names present in `other` replace ours
    pub fn merged_with(&self, other: &Headers) -> Headers {
        let mut merged = self.clone();
        for (name, _) in other.iter() {
            merged.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
        merged.0.extend(other.0.iter().cloned());
        merged
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Raw bytes with an explicit content type
    Raw {
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// HTTP proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Proxy URL in `http://host:port` form
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A logical HTTP request submitted to the
/// [`HttpManager`](crate::app::manager::HttpManager)
///
/// Requests are built fluently:
///
/// ```rust,no_run
/// use httpkit::app::{Priority, Request};
/// use std::time::Duration;
///
/// let request = Request::get("https://example.com/feed")
///     .with_param("page", "2")
///     .with_priority(Priority::High)
///     .with_tag("feed")
///     .with_cache_timeout(Duration::from_secs(300));
/// assert_eq!(request.effective_url(), "https://example.com/feed?page=2");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    /// Query parameters for GET, form fields for POST
    pub params: Vec<(String, String)>,
    pub body: RequestBody,
    pub should_cache: bool,
    /// Overrides the freshness lifetime computed from response headers
    pub cache_timeout: Option<Duration>,
    pub priority: Priority,
    /// Cancellation group
    pub tag: Option<String>,
    pub max_retries: u32,
    pub fix_no_response_bug: bool,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub proxy: Option<Proxy>,
    pub user_agent: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            params: Vec::new(),
            body: RequestBody::Empty,
            should_cache: true,
            cache_timeout: None,
            priority: Priority::default(),
            tag: None,
            max_retries: limits::DEFAULT_MAX_RETRIES,
            fix_no_response_bug: false,
            connect_timeout: http::CONNECT_TIMEOUT,
            socket_timeout: http::SOCKET_TIMEOUT,
            proxy: None,
            user_agent: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = RequestBody::Raw {
            content_type: content_type.into(),
            bytes: bytes.into(),
        };
        self
    }

    pub fn with_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = should_cache;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = Some(timeout);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_fix_no_response_bug(mut self, enabled: bool) -> Self {
        self.fix_no_response_bug = enabled;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, socket: Duration) -> Self {
        self.connect_timeout = connect;
        self.socket_timeout = socket;
        self
    }

    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some(Proxy::new(host, port));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// URL actually sent on the wire; GET parameters are appended as a query string
    pub fn effective_url(&self) -> String {
        if self.method != Method::Get || self.params.is_empty() {
            return self.url.clone();
        }

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }

    /// Key of the disk-cache slot and dedup group for this request
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_url(&self.effective_url())
    }

    /// Encoded body and its content type, if the request carries one
    ///
    /// POST parameters are form-encoded unless an explicit raw body was set.
    pub fn encoded_body(&self) -> Option<(String, Vec<u8>)> {
        match (&self.body, self.method) {
            (RequestBody::Raw {
                content_type,
                bytes,
            }, _) => Some((content_type.clone(), bytes.clone())),
            (RequestBody::Empty, Method::Post) => {
                let form = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(self.params.iter())
                    .finish();
                Some((http::FORM_CONTENT_TYPE.to_string(), form.into_bytes()))
            }
            (RequestBody::Empty, Method::Get) => None,
        }
    }

    /// True when the request can share the default client
    pub fn is_base_request(&self) -> bool {
        self.max_retries == limits::DEFAULT_MAX_RETRIES
            && !self.fix_no_response_bug
            && self.connect_timeout == http::CONNECT_TIMEOUT
            && self.proxy.is_none()
            && self.user_agent.is_none()
    }
}

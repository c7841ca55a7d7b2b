//! HTTP client configuration and building logic
//!
//! [`ClientConfig`] holds the settings shared by every client. A
//! [`ClientProfile`] captures the per-request settings that force a dedicated
//! client: requests that differ from the defaults in any of them get their own
//! `reqwest::Client` so one request's settings never leak into another's.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app::models::{Proxy, Request};
use crate::constants::{http, limits};
use crate::errors::{ClientError, ClientResult, ConfigError, ConfigResult};

/// Configuration shared by all HTTP clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connect timeout for the default client
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Socket (read) timeout for requests that do not set one
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,
    /// Retries after the first attempt for the default client
    pub max_retries: u32,
    /// Pause between retry attempts
    #[serde(with = "humantime_serde")]
    pub retry_sleep: Duration,
    /// TCP keep-alive settings
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Default user agent
    pub user_agent: String,
    /// Keep cookies across requests of the same client
    pub cookie_store: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            socket_timeout: http::SOCKET_TIMEOUT,
            max_retries: limits::DEFAULT_MAX_RETRIES,
            retry_sleep: limits::RETRY_SLEEP,
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            max_redirects: http::MAX_REDIRECTS,
            user_agent: http::USER_AGENT.to_string(),
            cookie_store: true,
        }
    }
}

impl ClientConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "client.connect_timeout".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.socket_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "client.socket_timeout".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "client.user_agent".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Profile used by requests that keep every default
    pub fn base_profile(&self) -> ClientProfile {
        ClientProfile {
            max_retries: self.max_retries,
            fix_no_response_bug: false,
            connect_timeout: self.connect_timeout,
            proxy: None,
            user_agent: None,
        }
    }

    /// Builds a reqwest client for `profile`
    pub fn build_http_client(&self, profile: &ClientProfile) -> ClientResult<Client> {
        let user_agent = profile.user_agent.as_deref().unwrap_or(&self.user_agent);

        let mut client_builder = Client::builder()
            .cookie_store(self.cookie_store)
            .connect_timeout(profile.connect_timeout)
            .user_agent(user_agent)
            .tcp_nodelay(self.tcp_nodelay)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects));

        // stale keep-alive sockets are the usual source of "no response" failures
        client_builder = if profile.fix_no_response_bug {
            client_builder.pool_max_idle_per_host(0)
        } else {
            client_builder.pool_max_idle_per_host(self.pool_max_per_host)
        };

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        if let Some(proxy) = &profile.proxy {
            let proxy_url = proxy.url();
            let reqwest_proxy =
                reqwest::Proxy::all(&proxy_url).map_err(|e| ClientError::InvalidProxy {
                    proxy: proxy_url.clone(),
                    reason: e.to_string(),
                })?;
            client_builder = client_builder.proxy(reqwest_proxy);
        }

        Ok(client_builder.build()?)
    }
}

/// Per-request client settings
///
/// Two requests with equal profiles share a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientProfile {
    pub max_retries: u32,
    pub fix_no_response_bug: bool,
    pub connect_timeout: Duration,
    pub proxy: Option<Proxy>,
    pub user_agent: Option<String>,
}

impl ClientProfile {
    /// Profile demanded by `request`
    pub fn for_request(request: &Request) -> Self {
        Self {
            max_retries: request.max_retries,
            fix_no_response_bug: request.fix_no_response_bug,
            connect_timeout: request.connect_timeout,
            proxy: request.proxy.clone(),
            user_agent: request.user_agent.clone(),
        }
    }
}

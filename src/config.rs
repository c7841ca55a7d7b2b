//! Configuration management for httpkit
//!
//! This module provides TOML configuration with multi-source loading and
//! zero-config defaults. Every section is optional; missing keys fall back
//! to the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::client::ClientConfig;
use crate::app::manager::ManagerConfig;
use crate::app::worker::{ConfigPresets, WorkerConfig};
use crate::constants::{cache, config as paths, http, limits};
use crate::errors::{ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Disk cache settings
    pub cache: CacheConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Worker pool settings
    pub pool: PoolConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Run with a disk cache at all
    pub enabled: bool,
    /// Cache directory path (system cache directory if unset)
    pub cache_root: Option<PathBuf>,
    /// Maximum total size of cached responses in bytes
    pub max_size: u64,
    /// Redundant journal lines tolerated before compaction
    pub compact_threshold: usize,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_root: None,
            max_size: cache::DEFAULT_MAX_SIZE,
            compact_threshold: cache::JOURNAL_COMPACT_THRESHOLD,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_sleep: Duration,
    /// TCP keep-alive interval (unset = disabled)
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout (unset = no timeout)
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_per_host: usize,
    pub max_redirects: usize,
    /// User agent override
    pub user_agent: Option<String>,
    pub cookie_store: bool,
}

impl Default for ClientConfigToml {
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
            user_agent: None,
            cookie_store: true,
        }
    }
}

/// TOML-friendly worker pool configuration
///
/// A preset picks the pool shape; the optional fields override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfigToml {
    /// One of "elastic", "fixed", "single", "cached"
    pub preset: String,
    /// Worker count for the "fixed" preset
    pub workers: Option<usize>,
    pub core_workers: Option<usize>,
    pub max_workers: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub keep_alive: Option<Duration>,
    pub allow_core_timeout: Option<bool>,
    pub queue_capacity: Option<usize>,
}

impl Default for PoolConfigToml {
    fn default() -> Self {
        Self {
            preset: "elastic".to_string(),
            workers: None,
            core_workers: None,
            max_workers: None,
            keep_alive: None,
            allow_core_timeout: None,
            queue_capacity: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colored_output: true,
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown pool preset or a
    /// runtime configuration that fails validation
    pub fn to_runtime_config(&self) -> Result<ManagerConfig> {
        let config = ManagerConfig {
            cache: self
                .cache
                .enabled
                .then(|| self.cache.to_runtime_config()),
            client: self.client.to_runtime_config(),
            workers: self.pool.to_runtime_config()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or the first one found)
    ///
    /// CLI flags are applied on top by the caller.
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match &config_file_override {
            Some(path) => Some(path.clone()),
            None => Self::find_config_file(),
        };

        let Some(path) = config_path else {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            return Err(ConfigError::NotFound { path }.into());
        }
        Self::load_from_file(&path).await
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(paths::LOCAL_FILE)];
        if let Some(user) = Self::default_config_path() {
            search_paths.push(user);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        match &found {
            Some(path) => debug!("Found config file: {}", path.display()),
            None => debug!("No config file found in standard locations"),
        }
        found
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_DIR_NAME).join(paths::USER_FILE))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::Io)?;
        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::InvalidFormat)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Default configuration file content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# httpkit configuration
# Every key is optional; removing a line restores its default.

[cache]
enabled = true
# Cache directory (leave unset to use the system cache directory)
# cache_root = "/path/to/cache"

# Maximum total size of cached responses in bytes
max_size = {max_size}

# Redundant journal lines tolerated before the journal is rewritten
compact_threshold = {compact_threshold}

[client]
connect_timeout = "{connect}s"
socket_timeout = "{socket}s"
max_retries = {max_retries}
retry_sleep = "{retry_sleep}ms"
tcp_keepalive = "30s"
tcp_nodelay = true
pool_idle_timeout = "{pool_idle}s"
pool_max_per_host = {pool_max_per_host}
max_redirects = {max_redirects}
cookie_store = true
# user_agent = "my-app/1.0"

[pool]
# elastic: grows with load and scales with core count
# fixed:   exactly `workers` workers
# single:  one worker, strict priority order
# cached:  no core workers, grows on demand
preset = "elastic"
# workers = 8
# core_workers = 12
# max_workers = 200
# keep_alive = "4s"
# queue_capacity = 40

[logging]
level = "info"  # error, warn, info, debug, trace
colored_output = true
"#,
            max_size = cache::DEFAULT_MAX_SIZE,
            compact_threshold = cache::JOURNAL_COMPACT_THRESHOLD,
            connect = http::CONNECT_TIMEOUT.as_secs(),
            socket = http::SOCKET_TIMEOUT.as_secs(),
            max_retries = limits::DEFAULT_MAX_RETRIES,
            retry_sleep = limits::RETRY_SLEEP.as_millis(),
            pool_idle = http::POOL_IDLE_TIMEOUT.as_secs(),
            pool_max_per_host = http::POOL_MAX_PER_HOST,
            max_redirects = http::MAX_REDIRECTS,
        )
    }
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig
    pub fn to_runtime_config(&self) -> CacheConfig {
        CacheConfig {
            cache_root: self.cache_root.clone(),
            max_size: self.max_size,
            compact_threshold: self.compact_threshold,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            socket_timeout: self.socket_timeout,
            max_retries: self.max_retries,
            retry_sleep: self.retry_sleep,
            tcp_keepalive: self.tcp_keepalive,
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_per_host: self.pool_max_per_host,
            max_redirects: self.max_redirects,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| http::USER_AGENT.to_string()),
            cookie_store: self.cookie_store,
        }
    }
}

impl PoolConfigToml {
    /// Convert to runtime WorkerConfig
    pub fn to_runtime_config(&self) -> Result<WorkerConfig> {
        let mut config = match self.preset.to_ascii_lowercase().as_str() {
            "elastic" => ConfigPresets::elastic(),
            "fixed" => ConfigPresets::fixed(self.workers.unwrap_or(1)),
            "single" => ConfigPresets::single(),
            "cached" => ConfigPresets::cached(),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "pool.preset".to_string(),
                    reason: format!("unknown preset '{other}'"),
                }
                .into())
            }
        };

        if let Some(core) = self.core_workers {
            config = config.with_core_workers(core);
        }
        if let Some(max) = self.max_workers {
            config = config.with_max_workers(max);
        }
        if let Some(keep_alive) = self.keep_alive {
            config = config.with_keep_alive(keep_alive);
        }
        if let Some(allow) = self.allow_core_timeout {
            config = config.with_allow_core_timeout(allow);
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        Ok(config)
    }
}

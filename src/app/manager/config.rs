//! Manager configuration

use crate::app::cache::CacheConfig;
use crate::app::client::ClientConfig;
use crate::app::worker::WorkerConfig;
use crate::errors::Result;

/// Everything an [`HttpManager`](super::HttpManager) needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Disk cache settings; `None` runs without a disk cache
    pub cache: Option<CacheConfig>,
    pub client: ClientConfig,
    pub workers: WorkerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache: Some(CacheConfig::default()),
            client: ClientConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Validate every component configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        self.client.validate()?;
        self.workers.validate()?;
        Ok(())
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn with_workers(mut self, workers: WorkerConfig) -> Self {
        self.workers = workers;
        self
    }
}

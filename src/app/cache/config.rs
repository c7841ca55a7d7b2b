//! Disk cache configuration types and defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Configuration for the [`DiskCache`](super::DiskCache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding entries and the journal (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Maximum total size of committed entries in bytes
    pub max_size: u64,
    /// Redundant journal lines tolerated before the journal is rewritten
    pub compact_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            max_size: cache::DEFAULT_MAX_SIZE,
            compact_threshold: cache::JOURNAL_COMPACT_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `cache_root`
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Set maximum cache size in bytes
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the journal compaction threshold
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig {
                reason: "max_size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Directory the cache will live in
    ///
    /// Defaults to the platform cache directory:
    /// - Linux: ~/.cache/httpkit/http
    /// - macOS: ~/Library/Caches/httpkit/http
    /// - Windows: %LOCALAPPDATA%/httpkit/http
    pub fn resolve_directory(&self) -> CacheResult<PathBuf> {
        match &self.cache_root {
            Some(path) => Ok(path.clone()),
            None => Ok(dirs::cache_dir()
                .ok_or_else(|| CacheError::DirectoryNotAccessible {
                    path: PathBuf::from("system cache directory"),
                })?
                .join(cache::APP_DIR_NAME)
                .join(cache::HTTP_DIR_NAME)),
        }
    }
}

//! Disk cache with journal-backed LRU eviction
//!
//! [`DiskCache`] stores one file per [`CacheKey`]. Writers go through a
//! [`CacheEditor`]: the entry is written to a temp file and only renamed over
//! the committed file on [`CacheEditor::commit`], so readers never observe a
//! partial entry. One editor per key may exist at a time; readers are never
//! blocked by editors.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::app::hash::CacheKey;
use crate::errors::{CacheError, CacheResult};

use super::config::CacheConfig;
use super::entry::CacheEntry;
use super::journal::{entry_path, remove_quietly, temp_path, Journal, LruIndex};
use super::stats::{CacheCounters, CacheStats};

/// Bounded on-disk response cache
#[derive(Debug)]
pub struct DiskCache {
    config: CacheConfig,
    directory: PathBuf,
    init: OnceCell<()>,
    closed: AtomicBool,
    state: AsyncMutex<IndexState>,
    editing: Mutex<HashSet<CacheKey>>,
    counters: CacheCounters,
}

#[derive(Debug, Default)]
struct IndexState {
    journal: Option<Journal>,
    index: LruIndex,
}

impl DiskCache {
    /// Create a cache handle; nothing touches the disk until [`initialize`](Self::initialize)
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the configuration is invalid or no cache
    /// directory can be determined
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let directory = config.resolve_directory()?;
        Ok(Self {
            config,
            directory,
            init: OnceCell::new(),
            closed: AtomicBool::new(false),
            state: AsyncMutex::new(IndexState::default()),
            editing: Mutex::new(HashSet::new()),
            counters: CacheCounters::default(),
        })
    }

    /// Create the directory and rebuild the index from the journal
    ///
    /// Safe to call more than once; only the first successful call does any
    /// work. A failed attempt can be retried.
    pub async fn initialize(&self) -> CacheResult<()> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        self.init
            .get_or_try_init(|| async {
                ensure_directory_exists(&self.directory).await?;
                let (journal, index) = Journal::open(&self.directory).await?;
                info!(
                    "Disk cache ready at {} ({} entries, {} bytes)",
                    self.directory.display(),
                    index.len(),
                    index.total_size()
                );
                let mut state = self.state.lock().await;
                state.journal = Some(journal);
                state.index = index;
                Ok::<(), CacheError>(())
            })
            .await?;
        Ok(())
    }

    /// Whether lookups and writes are currently served
    pub fn is_ready(&self) -> bool {
        self.init.initialized() && !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up an entry
    ///
    /// Returns `None` when the cache is not ready, the key is absent or the
    /// stored file fails validation. Damaged entries are removed.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.is_ready() {
            return None;
        }

        let known = self.state.lock().await.index.contains(key);
        if !known {
            CacheCounters::incr(&self.counters.misses);
            return None;
        }

        let path = entry_path(&self.directory, key);
        let decoded = match fs::read(&path).await {
            Ok(bytes) => CacheEntry::decode(key, &bytes),
            Err(e) => Err(e.into()),
        };

        match decoded {
            Ok(entry) => {
                CacheCounters::incr(&self.counters.hits);
                let mut state = self.state.lock().await;
                if state.index.touch(key) {
                    if let Some(journal) = state.journal.as_mut() {
                        if let Err(e) = journal.record_read(key).await {
                            warn!("Failed to journal read of {}: {}", key, e);
                        }
                    }
                }
                Some(entry)
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                // removed between the index check and the read
                CacheCounters::incr(&self.counters.misses);
                None
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                CacheCounters::incr(&self.counters.misses);
                CacheCounters::incr(&self.counters.corrupt_entries);
                if let Err(e) = self.remove(key).await {
                    warn!("Failed to remove damaged entry {}: {}", key, e);
                }
                None
            }
        }
    }

    /// Store an entry, replacing any previous one atomically
    pub async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> CacheResult<()> {
        let mut editor = self.edit(key)?;
        editor.write(entry).await?;
        editor.commit().await
    }

    /// Claim the write slot for `key`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::EditInProgress` if another editor holds the slot
    pub fn edit(&self, key: &CacheKey) -> CacheResult<CacheEditor<'_>> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        if !self.init.initialized() {
            return Err(CacheError::NotInitialized);
        }
        if !self.editing.lock().insert(*key) {
            return Err(CacheError::EditInProgress { key: key.to_hex() });
        }
        Ok(CacheEditor {
            cache: self,
            key: *key,
            temp_path: temp_path(&self.directory, key),
            written: None,
            done: false,
        })
    }

    /// Remove an entry, returning whether one existed
    pub async fn remove(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut state = self.state.lock().await;
        if state.index.remove(key).is_none() {
            return Ok(false);
        }
        if let Some(journal) = state.journal.as_mut() {
            journal.record_remove(key).await?;
        }
        remove_quietly(&entry_path(&self.directory, key)).await;
        debug!("Removed cache entry {}", key);
        self.compact_if_needed(&mut state).await;
        Ok(true)
    }

    /// Delete every committed entry
    pub async fn clear(&self) -> CacheResult<()> {
        if !self.is_ready() {
            return Err(CacheError::NotInitialized);
        }
        let mut state = self.state.lock().await;
        let mut removed = 0usize;
        while let Some((key, _)) = state.index.pop_lru() {
            remove_quietly(&entry_path(&self.directory, &key)).await;
            removed += 1;
        }
        state.index.clear();

        let IndexState { journal, index } = &mut *state;
        if let Some(journal) = journal.as_mut() {
            journal.rewrite(index).await?;
        }
        info!("Cleared {} entries from disk cache", removed);
        Ok(())
    }

    /// Flush the journal and stop serving requests
    ///
    /// Errors are logged and swallowed. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(mut journal) = state.journal.take() {
            if let Err(e) = journal.close().await {
                warn!("Error while closing cache journal: {}", e);
            }
        }
        debug!("Disk cache closed");
    }

    /// Snapshot of usage and counters
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            directory: self.directory.clone(),
            ready: self.is_ready(),
            entry_count: state.index.len(),
            total_size: state.index.total_size(),
            max_size: self.config.max_size,
            hits: CacheCounters::load(&self.counters.hits),
            misses: CacheCounters::load(&self.counters.misses),
            writes: CacheCounters::load(&self.counters.writes),
            evictions: CacheCounters::load(&self.counters.evictions),
            corrupt_entries: CacheCounters::load(&self.counters.corrupt_entries),
        }
    }

    async fn commit_entry(&self, key: &CacheKey, temp: &Path, size: u64) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        if self.is_closed() || state.journal.is_none() {
            return Err(CacheError::Closed);
        }

        fs::rename(temp, entry_path(&self.directory, key)).await?;
        let replaced = state.index.insert(*key, size).is_some();
        if let Some(journal) = state.journal.as_mut() {
            journal.record_clean(key, size, replaced).await?;
        }
        CacheCounters::incr(&self.counters.writes);

        let mut evicted = 0u64;
        while state.index.total_size() > self.config.max_size {
            let Some((victim, _)) = state.index.pop_lru() else {
                break;
            };
            if let Some(journal) = state.journal.as_mut() {
                journal.record_remove(&victim).await?;
            }
            remove_quietly(&entry_path(&self.directory, &victim)).await;
            evicted += 1;
        }
        if evicted > 0 {
            CacheCounters::add(&self.counters.evictions, evicted);
            debug!("Evicted {} cache entries to stay under {} bytes", evicted, self.config.max_size);
        }

        self.compact_if_needed(&mut state).await;
        Ok(())
    }

    async fn compact_if_needed(&self, state: &mut IndexState) {
        let IndexState { journal, index } = state;
        let Some(journal) = journal.as_mut() else {
            return;
        };
        if journal.needs_compaction(self.config.compact_threshold, index.len()) {
            match journal.rewrite(index).await {
                Ok(()) => debug!("Compacted cache journal to {} entries", index.len()),
                Err(e) => warn!("Cache journal compaction failed: {}", e),
            }
        }
    }
}

/// Exclusive writer for one cache key
///
/// Dropping an editor without committing discards whatever was written.
#[derive(Debug)]
pub struct CacheEditor<'a> {
    cache: &'a DiskCache,
    key: CacheKey,
    temp_path: PathBuf,
    written: Option<u64>,
    done: bool,
}

impl CacheEditor<'_> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Write the entry to the temp slot
    pub async fn write(&mut self, entry: &CacheEntry) -> CacheResult<()> {
        let bytes = entry.encode(&self.key)?;
        fs::write(&self.temp_path, &bytes).await?;
        self.written = Some(bytes.len() as u64);
        Ok(())
    }

    /// Publish the written entry
    pub async fn commit(mut self) -> CacheResult<()> {
        let Some(size) = self.written else {
            return Err(CacheError::Corruption {
                reason: format!("{}: commit without a written entry", self.key),
            });
        };
        let result = self
            .cache
            .commit_entry(&self.key, &self.temp_path, size)
            .await;
        if result.is_ok() {
            self.done = true;
        }
        result
    }

    /// Discard the written entry
    pub async fn abort(mut self) {
        remove_quietly(&self.temp_path).await;
        self.done = true;
    }
}

impl Drop for CacheEditor<'_> {
    fn drop(&mut self) {
        if !self.done && self.written.is_some() {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove temp file {}: {}", self.temp_path.display(), e);
                }
            }
        }
        self.cache.editing.lock().remove(&self.key);
    }
}

/// Ensure a directory exists, creating it if necessary
async fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).await.map_err(|e| {
            error!("Failed to create cache directory: {}", e);
            CacheError::DirectoryNotAccessible {
                path: path.to_path_buf(),
            }
        })?;
        debug!("Created cache directory: {}", path.display());
    }
    Ok(())
}

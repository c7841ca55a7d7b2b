//! Append-only cache journal and the LRU index it rebuilds
//!
//! The journal is a text file:
//!
//! ```text
//! httpkit.DiskCache
//! 1
//!
//! CLEAN 3400330d1dfc7f3f7f4b8d4d803dfcf6 832
//! READ 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! REMOVE 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! ```
//!
//! `CLEAN` marks a committed entry and its size, `READ` moves it to the most
//! recently used end, `REMOVE` drops it. Replaying the lines in order yields
//! the index. Lines that do not parse are skipped; a file with the wrong
//! header is ignored and rebuilt from scratch.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::app::hash::CacheKey;
use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Committed entries ordered from least to most recently used
#[derive(Debug, Default)]
pub(crate) struct LruIndex {
    entries: HashMap<CacheKey, IndexEntry>,
    order: BTreeMap<u64, CacheKey>,
    tick: u64,
    total_size: u64,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    tick: u64,
}

impl LruIndex {
    /// Insert or replace an entry as most recently used, returning the old size
    pub fn insert(&mut self, key: CacheKey, size: u64) -> Option<u64> {
        let previous = self.remove(&key);
        let tick = self.next_tick();
        self.entries.insert(key, IndexEntry { size, tick });
        self.order.insert(tick, key);
        self.total_size = self.total_size.saturating_add(size);
        previous
    }

    /// Mark an entry as most recently used
    pub fn touch(&mut self, key: &CacheKey) -> bool {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.order.remove(&entry.tick);
                entry.tick = tick;
                self.order.insert(tick, *key);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<u64> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry.size)
    }

    /// Remove the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(CacheKey, u64)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some((key, entry.size))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Entries from least to most recently used
    pub fn iter_lru(&self) -> impl Iterator<Item = (CacheKey, u64)> + '_ {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|entry| (*key, entry.size)))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_size = 0;
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum JournalOp {
    Clean(CacheKey, u64),
    Read(CacheKey),
    Remove(CacheKey),
}

impl JournalOp {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let op = parts.next()?;
        let key = parts.next()?.parse::<CacheKey>().ok()?;
        let parsed = match op {
            "CLEAN" => JournalOp::Clean(key, parts.next()?.parse().ok()?),
            "READ" => JournalOp::Read(key),
            "REMOVE" => JournalOp::Remove(key),
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(parsed)
    }

    fn to_line(&self) -> String {
        match self {
            JournalOp::Clean(key, size) => format!("CLEAN {key} {size}\n"),
            JournalOp::Read(key) => format!("READ {key}\n"),
            JournalOp::Remove(key) => format!("REMOVE {key}\n"),
        }
    }
}

/// Writer side of the journal
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    redundant: usize,
}

impl Journal {
    /// Open the journal in `directory`, replaying it into an index
    ///
    /// Entries whose files are missing are dropped and stray entry or temp
    /// files are deleted. The journal is then rewritten compactly.
    pub async fn open(directory: &Path) -> CacheResult<(Self, LruIndex)> {
        let path = directory.join(cache::JOURNAL_FILE);
        let tmp_path = directory.join(cache::JOURNAL_TMP_FILE);

        let mut index = match fs::read_to_string(&path).await {
            Ok(contents) => replay(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LruIndex::default(),
            Err(e) => return Err(e.into()),
        };

        reconcile_directory(directory, &mut index).await?;

        let mut journal = Self {
            path,
            tmp_path,
            writer: None,
            redundant: 0,
        };
        journal.rewrite(&index).await?;

        debug!(
            "Opened cache journal with {} entries ({} bytes)",
            index.len(),
            index.total_size()
        );
        Ok((journal, index))
    }

    pub async fn record_clean(&mut self, key: &CacheKey, size: u64, replaced: bool) -> CacheResult<()> {
        if replaced {
            self.redundant += 1;
        }
        self.append(JournalOp::Clean(*key, size)).await
    }

    pub async fn record_read(&mut self, key: &CacheKey) -> CacheResult<()> {
        self.redundant += 1;
        self.append(JournalOp::Read(*key)).await
    }

    pub async fn record_remove(&mut self, key: &CacheKey) -> CacheResult<()> {
        // the REMOVE line and the CLEAN it cancels are both dead weight
        self.redundant += 2;
        self.append(JournalOp::Remove(*key)).await
    }

    /// Whether enough dead lines have accumulated to rewrite the file
    pub fn needs_compaction(&self, threshold: usize, live_entries: usize) -> bool {
        self.redundant >= threshold && self.redundant >= live_entries
    }

    /// Replace the journal with one `CLEAN` line per live entry
    pub async fn rewrite(&mut self, index: &LruIndex) -> CacheResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
        }

        let mut contents = format!("{}\n{}\n\n", cache::JOURNAL_MAGIC, cache::JOURNAL_VERSION);
        for (key, size) in index.iter_lru() {
            contents.push_str(&JournalOp::Clean(key, size).to_line());
        }
        fs::write(&self.tmp_path, contents).await?;
        fs::rename(&self.tmp_path, &self.path).await?;

        let file = OpenOptions::new().append(true).open(&self.path).await?;
        self.writer = Some(BufWriter::new(file));
        self.redundant = 0;
        Ok(())
    }

    /// Flush and release the file handle
    pub async fn close(&mut self) -> CacheResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_mut().sync_all().await?;
        }
        Ok(())
    }

    async fn append(&mut self, op: JournalOp) -> CacheResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(CacheError::Closed);
        };
        writer.write_all(op.to_line().as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn replay(contents: &str) -> LruIndex {
    let mut index = LruIndex::default();
    let mut lines = contents.lines();

    let magic = lines.next();
    let version = lines.next();
    let blank = lines.next();
    if magic != Some(cache::JOURNAL_MAGIC)
        || version.and_then(|v| v.parse::<u32>().ok()) != Some(cache::JOURNAL_VERSION)
        || blank != Some("")
    {
        warn!("Cache journal header not recognised, rebuilding index");
        return index;
    }

    for (number, line) in lines.enumerate() {
        match JournalOp::parse(line) {
            Some(JournalOp::Clean(key, size)) if index.total_size().checked_add(size).is_some() => {
                index.insert(key, size);
            }
            Some(JournalOp::Clean(key, size)) => {
                warn!(
                    "Skipping journal line {}: size {} of {} overflows the index",
                    number + 4,
                    size,
                    key
                );
            }
            Some(JournalOp::Read(key)) => {
                index.touch(&key);
            }
            Some(JournalOp::Remove(key)) => {
                index.remove(&key);
            }
            None if line.trim().is_empty() => {}
            None => warn!("Skipping malformed journal line {}: {:?}", number + 4, line),
        }
    }
    index
}

/// Drop index entries without files and delete files without index entries
async fn reconcile_directory(directory: &Path, index: &mut LruIndex) -> CacheResult<()> {
    let mut present = HashMap::new();
    let mut entries = fs::read_dir(directory).await?;
    while let Some(dir_entry) = entries.next_entry().await? {
        let path = dir_entry.path();
        let extension = path.extension().and_then(|e| e.to_str());

        if extension == Some(cache::TEMP_EXTENSION) {
            debug!("Removing abandoned temp file {}", path.display());
            remove_quietly(&path).await;
            continue;
        }
        if extension != Some(cache::ENTRY_EXTENSION) {
            continue;
        }

        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<CacheKey>().ok());
        match key {
            Some(key) if index.contains(&key) => {
                let size = dir_entry.metadata().await?.len();
                present.insert(key, size);
            }
            _ => {
                debug!("Removing unreferenced cache file {}", path.display());
                remove_quietly(&path).await;
            }
        }
    }

    let missing: Vec<CacheKey> = index
        .iter_lru()
        .filter(|(key, size)| present.get(key) != Some(size))
        .map(|(key, _)| key)
        .collect();
    for key in missing {
        warn!("Cache entry {} missing or resized on disk, dropping", key);
        index.remove(&key);
        remove_quietly(&entry_path(directory, &key)).await;
    }
    Ok(())
}

/// Path of the committed file for `key`
pub(crate) fn entry_path(directory: &Path, key: &CacheKey) -> PathBuf {
    directory.join(format!("{}.{}", key, cache::ENTRY_EXTENSION))
}

/// Path of the in-progress file for `key`
pub(crate) fn temp_path(directory: &Path, key: &CacheKey) -> PathBuf {
    directory.join(format!("{}.{}", key, cache::TEMP_EXTENSION))
}

pub(crate) async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

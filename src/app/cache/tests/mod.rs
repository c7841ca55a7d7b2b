//! Disk cache behaviour against a real temp directory

use std::sync::Arc;

use tempfile::TempDir;

use crate::app::cache::{CacheConfig, CacheEntry, DiskCache};
use crate::app::hash::CacheKey;
use crate::constants::cache;
use crate::errors::CacheError;

fn entry(body: &[u8]) -> CacheEntry {
    CacheEntry {
        data: body.to_vec(),
        etag: Some("\"abc\"".to_string()),
        server_date: 1_700_000_000_000,
        ttl: 1_700_000_060_000,
        soft_ttl: 1_700_000_060_000,
        headers: [("Content-Type", "text/plain"), ("X-Trace", "1"), ("X-Trace", "2")]
            .into_iter()
            .collect(),
    }
}

async fn open(dir: &TempDir, max_size: u64) -> DiskCache {
    let config = CacheConfig::with_cache_root(dir.path().to_path_buf()).with_max_size(max_size);
    let cache = DiskCache::new(config).unwrap();
    cache.initialize().await.unwrap();
    cache
}

#[tokio::test]
async fn test_put_then_get_returns_identical_entry() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 1024 * 1024).await;
    let key = CacheKey::for_url("https://example.com/a");

    let stored = entry(b"payload bytes");
    cache.put(&key, &stored).await.unwrap();

    let loaded = cache.get(&key).await.unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(loaded.headers.iter().count(), 3);

    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.writes, 1);
}

#[tokio::test]
async fn test_get_before_initialize_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::with_cache_root(dir.path().to_path_buf());
    let cache = DiskCache::new(config).unwrap();
    let key = CacheKey::for_url("https://example.com/a");

    assert!(!cache.is_ready());
    assert!(cache.get(&key).await.is_none());
    assert!(matches!(cache.put(&key, &entry(b"x")).await, Err(CacheError::NotInitialized)));

    cache.initialize().await.unwrap();
    cache.initialize().await.unwrap();
    assert!(cache.is_ready());
}

#[tokio::test]
async fn test_corrupt_entry_reads_as_miss_and_is_removed() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 1024 * 1024).await;
    let key = CacheKey::for_url("https://example.com/corrupt");
    cache.put(&key, &entry(b"original")).await.unwrap();

    let path = dir.path().join(format!("{}.{}", key, cache::ENTRY_EXTENSION));
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    std::fs::write(&path, bytes).unwrap();

    assert!(cache.get(&key).await.is_none());
    assert!(!path.exists());

    let stats = cache.stats().await;
    assert_eq!(stats.corrupt_entries, 1);
    assert_eq!(stats.entry_count, 0);
}

#[tokio::test]
async fn test_lru_eviction_respects_max_size() {
    let dir = TempDir::new().unwrap();
    let key_a = CacheKey::for_url("https://example.com/a");
    let key_b = CacheKey::for_url("https://example.com/b");
    let key_c = CacheKey::for_url("https://example.com/c");

    let body = vec![b'x'; 400];
    let one_entry = entry(&body).encode(&key_a).unwrap().len() as u64;
    let cache = open(&dir, one_entry * 2 + one_entry / 2).await;

    cache.put(&key_a, &entry(&body)).await.unwrap();
    cache.put(&key_b, &entry(&body)).await.unwrap();
    // a becomes most recently used, so b is the victim
    assert!(cache.get(&key_a).await.is_some());
    cache.put(&key_c, &entry(&body)).await.unwrap();

    assert!(cache.get(&key_a).await.is_some());
    assert!(cache.get(&key_b).await.is_none());
    assert!(cache.get(&key_c).await.is_some());

    let stats = cache.stats().await;
    assert_eq!(stats.evictions, 1);
    assert!(stats.total_size <= stats.max_size);
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let key = CacheKey::for_url("https://example.com/persisted");
    let gone = CacheKey::for_url("https://example.com/removed");

    {
        let cache = open(&dir, 1024 * 1024).await;
        cache.put(&key, &entry(b"kept")).await.unwrap();
        cache.put(&gone, &entry(b"dropped")).await.unwrap();
        assert!(cache.remove(&gone).await.unwrap());
        cache.close().await;
        assert!(cache.get(&key).await.is_none());
    }

    let cache = open(&dir, 1024 * 1024).await;
    assert_eq!(cache.get(&key).await.unwrap().data, b"kept".to_vec());
    assert!(cache.get(&gone).await.is_none());
    assert_eq!(cache.stats().await.entry_count, 1);
}

#[tokio::test]
async fn test_uncommitted_edit_is_invisible() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 1024 * 1024).await;
    let key = CacheKey::for_url("https://example.com/pending");

    let mut editor = cache.edit(&key).unwrap();
    editor.write(&entry(b"half")).await.unwrap();
    assert!(cache.get(&key).await.is_none());
    assert!(matches!(cache.edit(&key), Err(CacheError::EditInProgress { .. })));

    drop(editor);
    assert!(cache.get(&key).await.is_none());
    let temp = dir.path().join(format!("{}.{}", key, cache::TEMP_EXTENSION));
    assert!(!temp.exists());

    let mut editor = cache.edit(&key).unwrap();
    editor.write(&entry(b"whole")).await.unwrap();
    editor.commit().await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap().data, b"whole".to_vec());
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir, 1024 * 1024).await;
    for n in 0..5 {
        let key = CacheKey::for_url(&format!("https://example.com/{n}"));
        cache.put(&key, &entry(b"data")).await.unwrap();
    }
    assert_eq!(cache.stats().await.entry_count, 5);

    cache.clear().await.unwrap();
    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.total_size, 0);

    let leftover = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == cache::ENTRY_EXTENSION))
        .count();
    assert_eq!(leftover, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_and_readers() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(open(&dir, 1024 * 1024).await);

    let mut handles = Vec::new();
    for n in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let key = CacheKey::for_url(&format!("https://example.com/{}", n % 4));
            let body = format!("body-{n}");
            // losing the editor race is expected here
            let _ = cache.put(&key, &entry(body.as_bytes())).await;
            if let Some(found) = cache.get(&key).await {
                assert!(found.data.starts_with(b"body-"));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(cache.stats().await.entry_count <= 4);
}

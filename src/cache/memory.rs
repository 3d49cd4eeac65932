//! In-memory KeyValueStore for tests and single-process development.

use super::error::CacheResult;
use super::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Instant::now()).unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let live = entries.get(key).map(|e| !e.is_expired()).unwrap_or(false);
        if live {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.get(key).await.map(|v| v.is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.value.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match entry.expires_at {
                Some(at) => Ok(at.saturating_duration_since(Instant::now()).as_secs() as i64),
                None => Ok(-1),
            },
            _ => Ok(-2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_absent_rejects_live_key() {
        let store = MemoryStore::new();

        assert!(store
            .set_if_absent("k", "first", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("k", "second", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_missing() {
        let store = MemoryStore::new();

        store
            .set("k", "v", Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_counts_up() {
        let store = MemoryStore::new();

        assert_eq!(store.increment("c", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.increment("c", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.increment("c", Duration::from_secs(60)).await.unwrap(), 3);
    }
}

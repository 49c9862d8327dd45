//! In-process key-value store with per-key expiry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KvError, KvStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// `HashMap` behind a mutex; expired entries are treated as absent and
/// removed lazily or by [`MemoryStore::purge_expired`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, entry| entry.is_live(now));
        before - map.len()
    }

    /// Current value of a live key
    pub async fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.lock().await;
        map.get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, expired ones included until purged
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut map = self.inner.lock().await;
        let now = Instant::now();

        if map.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        map.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: now + Duration::from_millis(super::ttl_millis(ttl)),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        Ok(map.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let mut map = self.inner.lock().await;
        let now = Instant::now();

        match map.get(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let map = self.inner.lock().await;
        Ok(map.get(key).is_some_and(|entry| entry.is_live(Instant::now())))
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_only_sets_once() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_nx_px("k", "a", ttl).await.unwrap());
        assert!(!store.set_nx_px("k", "b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_can_be_set_again() {
        let store = MemoryStore::new();

        assert!(store.set_nx_px("k", "a", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(store.set_nx_px("k", "b", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn del_reports_removal() {
        let store = MemoryStore::new();
        store
            .set_nx_px("k", "a", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn del_if_eq_checks_value() {
        let store = MemoryStore::new();
        store
            .set_nx_px("k", "owner-1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.del_if_eq("k", "owner-2").await.unwrap());
        assert!(store.exists("k").await.unwrap());

        assert!(store.del_if_eq("k", "owner-1").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::new();
        store
            .set_nx_px("short", "1", Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_nx_px("long", "1", Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.exists("long").await.unwrap());
    }
}

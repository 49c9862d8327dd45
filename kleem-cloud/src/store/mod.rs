//! Key-value store capability
//!
//! The catalog sync coordinator only needs a handful of single-key atomic
//! primitives. They are expressed as the [`KvStore`] trait so the same code
//! runs against Redis in production and [`MemoryStore`] in tests or in a
//! development environment without Redis.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Key-value store failure
#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Shared handle to the configured store
pub type SharedStore = Arc<dyn KvStore>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `SET key value PX ttl NX`: returns `true` when the key was set.
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    /// `DEL key`: returns `true` when a key was removed.
    async fn del(&self, key: &str) -> Result<bool, KvError>;

    /// Delete `key` only while it still holds `expected` (atomic compare-and-delete).
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// Whether a live (non-expired) entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), KvError>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// PX argument for a TTL; Redis rejects 0.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(600)), 600_000);
    }
}

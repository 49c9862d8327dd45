//! TTL-bounded distributed lock over the key-value store
//!
//! Acquisition is a single `SET lock:{name} <token> PX ttl NX`, so a crashed
//! holder can never wedge a lock past its TTL. Each acquisition stores a fresh
//! random token; [`DistributedLock::release`] deletes the key only while it
//! still holds that token, so a holder whose TTL lapsed cannot free a lock
//! that someone else has since acquired. [`DistributedLock::unlock`] is the
//! unconditional variant.

use std::time::Duration;

use crate::store::{KvError, SharedStore};

/// TTL used when the caller does not pass one
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5 * 60);
/// TTL for a merchant catalog sync
pub const CATALOG_SYNC_LOCK_TTL: Duration = Duration::from_secs(10 * 60);

const LOCK_PREFIX: &str = "lock:";

/// Lock name guarding one merchant's catalog sync
pub fn catalog_sync_lock_name(merchant_id: &str) -> String {
    format!("catalog-sync:{merchant_id}")
}

/// Proof of a successful acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    key: String,
    token: String,
    ttl: Duration,
}

impl LockLease {
    /// Full store key (`lock:{name}`)
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Clone)]
pub struct DistributedLock {
    store: SharedStore,
    default_ttl: Duration,
}

impl DistributedLock {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Store key for a lock name
    pub fn key_for(name: &str) -> String {
        format!("{LOCK_PREFIX}{name}")
    }

    /// Try to acquire `name` for `ttl` (or the default TTL).
    ///
    /// Not reentrant: a second attempt while the lock is held returns `None`,
    /// whoever makes it.
    pub async fn try_lock(
        &self,
        name: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<LockLease>, KvError> {
        let key = Self::key_for(name);
        let ttl = ttl.unwrap_or(self.default_ttl);
        let token = uuid::Uuid::new_v4().to_string();

        if self.store.set_nx_px(&key, &token, ttl).await? {
            tracing::debug!(lock = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            Ok(Some(LockLease { key, token, ttl }))
        } else {
            Ok(None)
        }
    }

    /// Release a lease. Returns `false` when the lease had already expired
    /// (and possibly been taken over), in which case nothing is deleted.
    pub async fn release(&self, lease: &LockLease) -> Result<bool, KvError> {
        let released = self.store.del_if_eq(&lease.key, &lease.token).await?;
        if released {
            tracing::debug!(lock = %lease.key, "Lock released");
        }
        Ok(released)
    }

    /// Delete `name` regardless of who holds it.
    pub async fn unlock(&self, name: &str) -> Result<bool, KvError> {
        self.store.del(&Self::key_for(name)).await
    }

    pub async fn is_locked(&self, name: &str) -> Result<bool, KvError> {
        self.store.exists(&Self::key_for(name)).await
    }

    /// Wrap a lease in a guard that releases it on drop if not released
    /// explicitly.
    pub fn guard(&self, lease: LockLease) -> LeaseGuard {
        LeaseGuard {
            lock: self.clone(),
            lease: Some(lease),
        }
    }
}

/// Releases its lease when dropped (e.g. the owning task was cancelled).
///
/// Prefer [`LeaseGuard::release`], which reports the outcome; the drop path
/// spawns the release on the current runtime and only logs.
pub struct LeaseGuard {
    lock: DistributedLock,
    lease: Option<LockLease>,
}

impl LeaseGuard {
    pub fn lease(&self) -> Option<&LockLease> {
        self.lease.as_ref()
    }

    pub async fn release(mut self) -> Result<bool, KvError> {
        match self.lease.take() {
            Some(lease) => self.lock.release(&lease).await,
            None => Ok(false),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let lock = self.lock.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release(&lease).await {
                        tracing::error!(lock = %lease.key, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock = %lease.key, "Lock dropped outside runtime, left to expire");
            }
        }
    }
}

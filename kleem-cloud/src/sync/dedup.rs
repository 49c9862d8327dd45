//! Message de-duplication gate

use std::time::Duration;

use crate::store::{KvError, SharedStore};

/// How long a processed message id is remembered
pub const DEDUP_TTL: Duration = Duration::from_secs(600);

/// De-dup key for a catalog sync request
pub fn catalog_sync_key(merchant_id: &str, message_id: &str) -> String {
    format!("idem:catalog-sync:{merchant_id}:{message_id}")
}

/// De-dup key for an inbound platform webhook
pub fn webhook_key(provider: &str, merchant_id: &str, event_id: &str) -> String {
    format!("idem:webhook:{provider}:{merchant_id}:{event_id}")
}

/// Records "seen" for a key at most once per TTL window.
///
/// Store failures are returned to the caller; the gate never falls back to
/// treating a message as new.
#[derive(Clone)]
pub struct DedupGate {
    store: SharedStore,
    ttl: Duration,
}

impl DedupGate {
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns `true` the first time `key` is seen within the window.
    pub async fn check_and_mark(&self, key: &str) -> Result<bool, KvError> {
        self.store.set_nx_px(key, "1", self.ttl).await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

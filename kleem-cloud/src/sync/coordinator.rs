//! Catalog sync lifecycle
//!
//! ```text
//! envelope ─▶ parse ──(no merchantId)──▶ Dropped
//!               │
//!               ▼
//!            dedup ──(seen)──▶ Duplicate
//!               │
//!               ▼
//!            try_lock ──(held)──▶ notify already_running ─▶ AlreadyRunning
//!               │
//!               ▼
//!     notify started ─▶ worker (bounded by sync_timeout)
//!               │                     │
//!          Ok(result)              Err(e)
//!               ▼                     ▼
//!     notify completed        notify failed
//!               └──────┬──────────────┘
//!                      ▼
//!                release lease
//! ```
//!
//! Exactly one notification sequence reaches the requester:
//! `{already_running}`, `{started, completed}` or `{started, failed}`.

use serde_json::json;
use shared::{
    BusEnvelope, Notification, NotificationKind, Severity, SyncRequest, SyncRequestError,
    SyncResult,
};
use std::sync::Arc;
use std::time::Duration;

use super::dedup::{self, DEDUP_TTL, DedupGate};
use super::lock::{CATALOG_SYNC_LOCK_TTL, DistributedLock, catalog_sync_lock_name};
use super::worker::{CatalogSync, SyncError};
use crate::notify::Notifier;
use crate::store::{KvError, SharedStore};

/// Shown when the worker fails without a message
pub const FAILURE_FALLBACK: &str = "حدث خطأ غير متوقع أثناء مزامنة الكتالوج";

/// Terminal state of one handled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Malformed request, nothing done
    Dropped,
    /// Message id already processed inside the dedup window
    Duplicate,
    /// Another sync holds the merchant lock
    AlreadyRunning,
    Completed(SyncResult),
    /// Worker failed; carries the message sent to the user
    Failed(String),
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dropped => "dropped",
            Self::Duplicate => "duplicate",
            Self::AlreadyRunning => "already_running",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub lock_ttl: Duration,
    pub dedup_ttl: Duration,
    /// Hard bound on a worker call; never longer than `lock_ttl`
    pub sync_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: CATALOG_SYNC_LOCK_TTL,
            dedup_ttl: DEDUP_TTL,
            sync_timeout: CATALOG_SYNC_LOCK_TTL,
        }
    }
}

pub struct CatalogSyncCoordinator {
    dedup: DedupGate,
    lock: DistributedLock,
    worker: Arc<dyn CatalogSync>,
    notifier: Arc<dyn Notifier>,
    sync_timeout: Duration,
}

impl CatalogSyncCoordinator {
    pub fn new(
        store: SharedStore,
        worker: Arc<dyn CatalogSync>,
        notifier: Arc<dyn Notifier>,
        config: CoordinatorConfig,
    ) -> Self {
        // The worker must not outlive its lock, or a second sync could start
        // next to a stuck one.
        let sync_timeout = config.sync_timeout.min(config.lock_ttl);
        if sync_timeout < config.sync_timeout {
            tracing::warn!(
                timeout_secs = config.sync_timeout.as_secs(),
                lock_ttl_secs = config.lock_ttl.as_secs(),
                "Sync timeout exceeds the lock TTL, clamped"
            );
        }
        Self {
            dedup: DedupGate::new(store.clone(), config.dedup_ttl),
            lock: DistributedLock::new(store).with_default_ttl(config.lock_ttl),
            worker,
            notifier,
            sync_timeout,
        }
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// Whether a sync currently holds the merchant lock
    pub async fn is_running(&self, merchant_id: &str) -> Result<bool, KvError> {
        self.lock.is_locked(&catalog_sync_lock_name(merchant_id)).await
    }

    /// Validate a bus envelope and run it through the lifecycle.
    ///
    /// Malformed envelopes are dropped without side effects.
    pub async fn handle_envelope(&self, envelope: &BusEnvelope) -> Result<SyncOutcome, KvError> {
        match SyncRequest::from_envelope(envelope) {
            Ok(request) => self.handle(&request).await,
            Err(SyncRequestError::MissingMerchantId) => {
                tracing::debug!(envelope = %envelope, "Sync request without merchantId dropped");
                Ok(SyncOutcome::Dropped)
            }
            Err(e) => {
                tracing::warn!(envelope = %envelope, error = %e, "Malformed sync request dropped");
                Ok(SyncOutcome::Dropped)
            }
        }
    }

    /// Run one request through dedup → lock → worker → release.
    ///
    /// Store failures are returned; worker failures are not, they become a
    /// `failed` notification and [`SyncOutcome::Failed`].
    pub async fn handle(&self, request: &SyncRequest) -> Result<SyncOutcome, KvError> {
        let merchant_id = request.merchant_id.as_str();
        if merchant_id.trim().is_empty() {
            return Ok(SyncOutcome::Dropped);
        }

        let dedup_key = dedup::catalog_sync_key(merchant_id, &request.message_id);
        if !self.dedup.check_and_mark(&dedup_key).await? {
            tracing::info!(
                merchant_id = %merchant_id,
                message_id = %request.message_id,
                "Duplicate catalog sync request ignored"
            );
            return Ok(SyncOutcome::Duplicate);
        }

        let lock_name = catalog_sync_lock_name(merchant_id);
        let Some(lease) = self.lock.try_lock(&lock_name, None).await? else {
            tracing::info!(merchant_id = %merchant_id, "Catalog sync already running");
            self.notify(
                request,
                Notification::new(
                    NotificationKind::CatalogSyncAlreadyRunning,
                    merchant_id,
                    Severity::Info,
                    "مزامنة الكتالوج قيد التنفيذ",
                    "هناك مزامنة جارية بالفعل لهذا المتجر، سيتم إشعارك عند انتهائها",
                ),
            )
            .await;
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let guard = self.lock.guard(lease);
        let outcome = self.run_locked(request).await;

        match guard.release().await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                merchant_id = %merchant_id,
                "Catalog sync lock expired before release"
            ),
            // The TTL still bounds the lock; the sync itself already finished.
            Err(e) => tracing::error!(
                merchant_id = %merchant_id,
                error = %e,
                "Failed to release catalog sync lock"
            ),
        }

        Ok(outcome)
    }

    async fn run_locked(&self, request: &SyncRequest) -> SyncOutcome {
        let merchant_id = request.merchant_id.as_str();

        self.notify(
            request,
            Notification::new(
                NotificationKind::CatalogSyncStarted,
                merchant_id,
                Severity::Info,
                "بدأت مزامنة الكتالوج",
                format!("جارٍ مزامنة المنتجات من {}", request.source),
            ),
        )
        .await;

        tracing::info!(
            merchant_id = %merchant_id,
            source = %request.source,
            requested_by = request.requested_by.as_deref().unwrap_or("-"),
            "Catalog sync started"
        );

        let result = match tokio::time::timeout(
            self.sync_timeout,
            self.worker.sync_for_merchant(merchant_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.sync_timeout)),
        };

        match result {
            Ok(result) => {
                tracing::info!(
                    merchant_id = %merchant_id,
                    imported = result.imported,
                    updated = result.updated,
                    "Catalog sync completed"
                );
                self.notify(
                    request,
                    Notification::new(
                        NotificationKind::CatalogSyncCompleted,
                        merchant_id,
                        Severity::Success,
                        "اكتملت مزامنة الكتالوج",
                        format!(
                            "تم استيراد {} منتج وتحديث {} منتج",
                            result.imported, result.updated
                        ),
                    )
                    .with_data(json!({
                        "imported": result.imported,
                        "updated": result.updated,
                    })),
                )
                .await;
                SyncOutcome::Completed(result)
            }
            Err(e) => {
                tracing::error!(merchant_id = %merchant_id, error = %e, "Catalog sync failed");
                let body = failure_body(&e);
                self.notify(
                    request,
                    Notification::new(
                        NotificationKind::CatalogSyncFailed,
                        merchant_id,
                        Severity::Error,
                        "فشلت مزامنة الكتالوج",
                        body.clone(),
                    ),
                )
                .await;
                SyncOutcome::Failed(body)
            }
        }
    }

    /// Deliver to the requester; delivery problems never abort the lifecycle
    async fn notify(&self, request: &SyncRequest, notification: Notification) {
        let Some(user_id) = request.requested_by.as_deref() else {
            tracing::debug!(
                merchant_id = %request.merchant_id,
                kind = %notification.kind,
                "No requester to notify"
            );
            return;
        };

        if let Err(e) = self.notifier.notify_user(user_id, notification).await {
            tracing::warn!(user_id = %user_id, error = %e, "Notification delivery failed");
        }
    }
}

fn failure_body(error: &SyncError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        FAILURE_FALLBACK.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryStore};
    use crate::sync::testing::{Behavior, DownStore, FakeWorker, RecordingNotifier};
    use serde_json::json;

    struct Harness {
        store: MemoryStore,
        worker: Arc<FakeWorker>,
        notifier: Arc<RecordingNotifier>,
        coordinator: Arc<CatalogSyncCoordinator>,
    }

    fn harness_with(worker: FakeWorker, config: CoordinatorConfig) -> Harness {
        let store = MemoryStore::new();
        let worker = Arc::new(worker);
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Arc::new(CatalogSyncCoordinator::new(
            Arc::new(store.clone()),
            worker.clone(),
            notifier.clone(),
            config,
        ));
        Harness {
            store,
            worker,
            notifier,
            coordinator,
        }
    }

    fn harness(worker: FakeWorker) -> Harness {
        harness_with(worker, CoordinatorConfig::default())
    }

    fn request(merchant_id: &str, user: &str, message_id: &str) -> SyncRequest {
        SyncRequest {
            merchant_id: merchant_id.into(),
            requested_by: Some(user.into()),
            source: "salla".into(),
            message_id: message_id.into(),
        }
    }

    fn kinds(notifications: &[Notification]) -> Vec<NotificationKind> {
        notifications.iter().map(|n| n.kind).collect()
    }

    #[tokio::test]
    async fn success_notifies_started_then_completed() {
        let h = harness(FakeWorker::succeeding(12, 3));

        let outcome = h.coordinator.handle(&request("m1", "u1", "abc")).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncResult {
                imported: 12,
                updated: 3
            })
        );

        let sent = h.notifier.for_user("u1");
        assert_eq!(
            kinds(&sent),
            vec![
                NotificationKind::CatalogSyncStarted,
                NotificationKind::CatalogSyncCompleted
            ]
        );
        assert_eq!(sent[0].severity, Severity::Info);
        assert_eq!(sent[1].severity, Severity::Success);
        assert_eq!(sent[1].merchant_id, "m1");
        assert_eq!(sent[1].data, Some(json!({"imported": 12, "updated": 3})));

        assert!(!h.store.exists("lock:catalog-sync:m1").await.unwrap());
        assert!(h.store.exists("idem:catalog-sync:m1:abc").await.unwrap());
    }

    #[tokio::test]
    async fn failure_notifies_started_then_failed() {
        let h = harness(FakeWorker::new(Behavior::Fail("Salla token expired".into())));

        let outcome = h.coordinator.handle(&request("m1", "u1", "abc")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Failed("Salla token expired".into()));

        let sent = h.notifier.for_user("u1");
        assert_eq!(
            kinds(&sent),
            vec![
                NotificationKind::CatalogSyncStarted,
                NotificationKind::CatalogSyncFailed
            ]
        );
        assert_eq!(sent[1].severity, Severity::Error);
        assert_eq!(sent[1].body, "Salla token expired");
        assert!(!h.store.exists("lock:catalog-sync:m1").await.unwrap());
    }

    #[tokio::test]
    async fn empty_failure_message_uses_fallback() {
        let h = harness(FakeWorker::new(Behavior::Fail(String::new())));

        let outcome = h.coordinator.handle(&request("m1", "u1", "abc")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Failed(FAILURE_FALLBACK.into()));
        assert_eq!(h.notifier.for_user("u1")[1].body, FAILURE_FALLBACK);
    }

    #[tokio::test]
    async fn duplicate_message_is_a_no_op() {
        let h = harness(FakeWorker::succeeding(1, 0));
        let req = request("m1", "u1", "abc");

        h.coordinator.handle(&req).await.unwrap();
        let notified = h.notifier.sent().len();

        let second = h.coordinator.handle(&req).await.unwrap();
        assert_eq!(second, SyncOutcome::Duplicate);
        assert_eq!(h.worker.calls(), 1);
        assert_eq!(h.notifier.sent().len(), notified);
    }

    #[tokio::test(start_paused = true)]
    async fn same_message_after_window_runs_again() {
        let h = harness(FakeWorker::succeeding(1, 0));
        let req = request("m1", "u1", "abc");

        h.coordinator.handle(&req).await.unwrap();
        tokio::time::advance(DEDUP_TTL + Duration::from_secs(1)).await;

        let again = h.coordinator.handle(&req).await.unwrap();
        assert!(matches!(again, SyncOutcome::Completed(_)));
        assert_eq!(h.worker.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_request_for_same_merchant_is_already_running() {
        let h = harness(FakeWorker::succeeding(5, 5).gated());

        let first = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.handle(&request("m1", "u1", "first")).await })
        };
        h.worker.wait_entered(1).await;

        let second = h.coordinator.handle(&request("m1", "u2", "second")).await.unwrap();
        assert_eq!(second, SyncOutcome::AlreadyRunning);

        let u2 = h.notifier.for_user("u2");
        assert_eq!(kinds(&u2), vec![NotificationKind::CatalogSyncAlreadyRunning]);
        assert_eq!(u2[0].severity, Severity::Info);

        // The loser must not have released the winner's lock
        assert!(h.coordinator.is_running("m1").await.unwrap());

        h.worker.open_gate(1);
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SyncOutcome::Completed(_)));
        assert_eq!(h.worker.calls(), 1);
        assert!(!h.coordinator.is_running("m1").await.unwrap());
    }

    #[tokio::test]
    async fn different_merchants_run_concurrently() {
        let h = harness(FakeWorker::succeeding(1, 1).gated());

        let spawn = |merchant: &'static str| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.handle(&request(merchant, "u1", "msg")).await })
        };
        let a = spawn("m1");
        let b = spawn("m2");

        // Both inside the worker at once
        h.worker.wait_entered(2).await;
        assert!(h.coordinator.is_running("m1").await.unwrap());
        assert!(h.coordinator.is_running("m2").await.unwrap());

        h.worker.open_gate(2);
        assert!(matches!(a.await.unwrap().unwrap(), SyncOutcome::Completed(_)));
        assert!(matches!(b.await.unwrap().unwrap(), SyncOutcome::Completed(_)));
        assert_eq!(h.worker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_worker_times_out_and_releases() {
        let config = CoordinatorConfig {
            sync_timeout: Duration::from_secs(30),
            ..CoordinatorConfig::default()
        };
        let h = harness_with(FakeWorker::new(Behavior::Hang), config);

        let outcome = h.coordinator.handle(&request("m1", "u1", "abc")).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Failed("catalog sync timed out after 30s".into())
        );
        assert_eq!(
            kinds(&h.notifier.for_user("u1")),
            vec![
                NotificationKind::CatalogSyncStarted,
                NotificationKind::CatalogSyncFailed
            ]
        );
        assert!(!h.coordinator.is_running("m1").await.unwrap());
    }

    #[tokio::test]
    async fn sync_timeout_is_clamped_to_lock_ttl() {
        let config = CoordinatorConfig {
            lock_ttl: Duration::from_secs(60),
            dedup_ttl: DEDUP_TTL,
            sync_timeout: Duration::from_secs(3600),
        };
        let h = harness_with(FakeWorker::succeeding(0, 0), config);
        assert_eq!(h.coordinator.sync_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn missing_merchant_is_dropped() {
        let h = harness(FakeWorker::succeeding(1, 1));
        let envelope = BusEnvelope::catalog_sync_requested(json!({"requestedBy": "u1"}))
            .with_message_id("abc");

        let outcome = h.coordinator.handle_envelope(&envelope).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Dropped);
        assert_eq!(h.worker.calls(), 0);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn envelope_redelivery_is_deduplicated() {
        let h = harness(FakeWorker::succeeding(1, 1));
        let envelope = BusEnvelope::catalog_sync_requested(
            json!({"merchantId": "m1", "requestedBy": "u1", "source": "salla"}),
        )
        .with_message_id("abc");

        let first = h.coordinator.handle_envelope(&envelope).await.unwrap();
        let second = h.coordinator.handle_envelope(&envelope).await.unwrap();
        assert!(matches!(first, SyncOutcome::Completed(_)));
        assert_eq!(second, SyncOutcome::Duplicate);
        assert_eq!(h.worker.calls(), 1);
        assert_eq!(h.notifier.for_user("u1").len(), 2);
    }

    #[tokio::test]
    async fn no_requester_still_syncs() {
        let h = harness(FakeWorker::succeeding(2, 0));
        let mut req = request("m1", "u1", "abc");
        req.requested_by = None;

        let outcome = h.coordinator.handle(&req).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert!(h.notifier.sent().is_empty());
        assert!(!h.coordinator.is_running("m1").await.unwrap());
    }

    #[tokio::test]
    async fn store_failure_propagates_without_side_effects() {
        let worker = Arc::new(FakeWorker::succeeding(1, 1));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = CatalogSyncCoordinator::new(
            Arc::new(DownStore),
            worker.clone(),
            notifier.clone(),
            CoordinatorConfig::default(),
        );

        let result = coordinator.handle(&request("m1", "u1", "abc")).await;
        assert!(matches!(result, Err(KvError::Unavailable(_))));
        assert_eq!(worker.calls(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn outcome_names() {
        assert_eq!(SyncOutcome::AlreadyRunning.as_str(), "already_running");
        assert_eq!(SyncOutcome::Failed(String::new()).as_str(), "failed");
    }
}

//! Catalog sync consumer
//!
//! Reads envelopes off the bus and hands each `catalog.sync` / `requested`
//! one to the coordinator on its own task, so merchants never wait on each
//! other. In-flight tasks are bounded by a semaphore.

use shared::BusEnvelope;
use shared::message::{EVENT_REQUESTED, TOPIC_CATALOG_SYNC};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::sync::CatalogSyncCoordinator;

pub struct SyncConsumer {
    receiver: mpsc::Receiver<BusEnvelope>,
    coordinator: Arc<CatalogSyncCoordinator>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    shutdown_token: CancellationToken,
}

impl SyncConsumer {
    pub fn new(
        receiver: mpsc::Receiver<BusEnvelope>,
        coordinator: Arc<CatalogSyncCoordinator>,
        concurrency: usize,
        shutdown_token: CancellationToken,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            receiver,
            coordinator,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            shutdown_token,
        }
    }

    /// Consume until shutdown or until every publisher is gone.
    ///
    /// In-flight syncs are awaited before returning.
    pub async fn run(mut self) {
        tracing::info!(concurrency = self.concurrency, "Catalog sync consumer started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Catalog sync consumer shutting down");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(envelope) => self.dispatch(envelope).await,
                        None => {
                            tracing::info!("Bus closed");
                            break;
                        }
                    }
                }
            }
        }

        self.drain().await;
        tracing::info!("Catalog sync consumer stopped");
    }

    async fn dispatch(&self, envelope: BusEnvelope) {
        if !envelope.is(TOPIC_CATALOG_SYNC, EVENT_REQUESTED) {
            tracing::debug!(envelope = %envelope, "Ignoring envelope");
            return;
        }

        // Waiting for a permit must not outlast shutdown
        let permit = tokio::select! {
            biased;

            _ = self.shutdown_token.cancelled() => {
                tracing::info!(envelope = %envelope, "Shutdown requested, catalog sync not started");
                return;
            }

            // Closed only in drain(), after the loop
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match coordinator.handle_envelope(&envelope).await {
                Ok(outcome) => tracing::debug!(
                    envelope = %envelope,
                    outcome = outcome.as_str(),
                    "Catalog sync message handled"
                ),
                Err(e) => tracing::error!(
                    envelope = %envelope,
                    error = %e,
                    "Catalog sync message failed, not retried"
                ),
            }
        });
    }

    /// Wait for every running task to give its permit back
    async fn drain(&self) {
        let in_flight = self.concurrency - self.permits.available_permits();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for in-flight catalog syncs");
        }
        let total = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if let Ok(all) = self.permits.acquire_many(total).await {
            all.forget();
        }
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::sync::CoordinatorConfig;
    use crate::store::MemoryStore;
    use crate::sync::testing::{FakeWorker, RecordingNotifier};
    use serde_json::json;
    use shared::NotificationKind;

    fn coordinator(
        worker: Arc<FakeWorker>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<CatalogSyncCoordinator> {
        Arc::new(CatalogSyncCoordinator::new(
            Arc::new(MemoryStore::new()),
            worker,
            notifier,
            CoordinatorConfig::default(),
        ))
    }

    fn sync_request(merchant: &str, message_id: &str) -> BusEnvelope {
        BusEnvelope::catalog_sync_requested(
            json!({"merchantId": merchant, "requestedBy": "u1", "source": "salla"}),
        )
        .with_message_id(message_id)
    }

    #[tokio::test]
    async fn consumes_until_bus_closes_and_waits_for_in_flight() {
        let worker = Arc::new(FakeWorker::succeeding(3, 1));
        let notifier = Arc::new(RecordingNotifier::default());
        let (bus, rx) = EventBus::channel(16);
        let consumer = SyncConsumer::new(
            rx,
            coordinator(worker.clone(), notifier.clone()),
            4,
            CancellationToken::new(),
        );

        bus.publish(sync_request("m1", "a")).await.unwrap();
        bus.publish(sync_request("m2", "b")).await.unwrap();
        // Redelivery of the first message
        bus.publish(sync_request("m1", "a")).await.unwrap();
        bus.publish(BusEnvelope::new("orders", "created", json!({"merchantId": "m1"})))
            .await
            .unwrap();
        drop(bus);

        consumer.run().await;

        assert_eq!(worker.calls(), 2);
        let completed = notifier
            .for_user("u1")
            .into_iter()
            .filter(|n| n.kind == NotificationKind::CatalogSyncCompleted)
            .count();
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn stops_on_shutdown_token() {
        let worker = Arc::new(FakeWorker::succeeding(0, 0));
        let notifier = Arc::new(RecordingNotifier::default());
        let (bus, rx) = EventBus::channel(4);
        let token = CancellationToken::new();
        let consumer = SyncConsumer::new(rx, coordinator(worker.clone(), notifier), 2, token.clone());

        let handle = tokio::spawn(consumer.run());
        token.cancel();
        handle.await.unwrap();

        assert!(bus.is_closed());
        assert_eq!(worker.calls(), 0);
    }

    #[tokio::test]
    async fn no_new_sync_starts_after_shutdown() {
        let worker = Arc::new(FakeWorker::succeeding(1, 0).gated());
        let notifier = Arc::new(RecordingNotifier::default());
        let (bus, rx) = EventBus::channel(4);
        let token = CancellationToken::new();
        let consumer = SyncConsumer::new(
            rx,
            coordinator(worker.clone(), notifier.clone()),
            1,
            token.clone(),
        );

        bus.publish(sync_request("m1", "a")).await.unwrap();
        bus.publish(BusEnvelope::catalog_sync_requested(
            json!({"merchantId": "m2", "requestedBy": "u2", "source": "salla"}),
        )
        .with_message_id("b"))
        .await
        .unwrap();

        let handle = tokio::spawn(consumer.run());
        // m1 holds the only permit; m2 waits for it
        worker.wait_entered(1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        token.cancel();
        worker.open_gate(2);
        handle.await.unwrap();

        assert_eq!(worker.calls(), 1);
        assert_eq!(
            notifier.for_user("u1").last().map(|n| n.kind),
            Some(NotificationKind::CatalogSyncCompleted)
        );
        assert!(notifier.for_user("u2").is_empty());
    }
}

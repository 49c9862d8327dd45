//! In-process event bus
//!
//! ```text
//! HTTP trigger / webhook ──publish──▶ EventBus (mpsc, BUS_CAPACITY)
//!                                        │
//!                                        ▼
//!                                   SyncConsumer ──spawn per envelope──▶ CatalogSyncCoordinator
//! ```

mod consumer;

pub use consumer::SyncConsumer;

use shared::BusEnvelope;
use shared::error::{AppError, ErrorCode};
use tokio::sync::mpsc;

/// Default queue depth between producers and the consumer
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Publishing half of the bus
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<BusEnvelope>,
}

impl EventBus {
    /// Create a bus and the receiver its consumer reads from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BusEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue an envelope, waiting for room when the queue is full
    pub async fn publish(&self, envelope: BusEnvelope) -> Result<(), AppError> {
        tracing::debug!(envelope = %envelope, "Publish");
        self.tx.send(envelope).await.map_err(|e| {
            tracing::error!(envelope = %e.0, "Bus closed, envelope dropped");
            AppError::new(ErrorCode::BusUnavailable)
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

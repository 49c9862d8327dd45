//! Application state for kleem-cloud

use shared::BusEnvelope;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::{CsrfBypass, RateLimiter};
use crate::bus::EventBus;
use crate::config::Config;
use crate::notify::NotificationHub;
use crate::store::{MemoryStore, RedisStore, SharedStore};
use crate::sync::{CatalogSync, CatalogSyncCoordinator, DedupGate, HttpCatalogSync};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Redis in production, in-memory in development
    pub store: SharedStore,
    /// Set when `store` is in-memory, for periodic expiry sweeps
    pub memory_store: Option<MemoryStore>,
    pub coordinator: Arc<CatalogSyncCoordinator>,
    /// Webhook event de-duplication
    pub webhook_dedup: DedupGate,
    pub bus: EventBus,
    pub hub: NotificationHub,
    pub rate_limiter: RateLimiter,
    pub csrf_bypass: Arc<CsrfBypass>,
}

impl AppState {
    /// Connect the store and build the production worker.
    ///
    /// Returns the bus receiver for the consumer.
    pub async fn new(config: Config) -> Result<(Self, mpsc::Receiver<BusEnvelope>), BoxError> {
        let (store, memory_store): (SharedStore, Option<MemoryStore>) = match &config.redis_url {
            Some(url) => {
                let redis = RedisStore::connect(url).await?;
                tracing::info!("Redis store ready");
                (Arc::new(redis), None)
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory store (single instance only)");
                let memory = MemoryStore::new();
                (Arc::new(memory.clone()), Some(memory))
            }
        };

        let worker = HttpCatalogSync::new(
            config.catalog_service_url.clone(),
            config.catalog_service_token.clone(),
            config.sync_timeout,
        )?;

        Ok(Self::with_parts(config, store, memory_store, Arc::new(worker)))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        config: Config,
        store: SharedStore,
        memory_store: Option<MemoryStore>,
        worker: Arc<dyn CatalogSync>,
    ) -> (Self, mpsc::Receiver<BusEnvelope>) {
        let hub = NotificationHub::new();
        let coordinator = Arc::new(CatalogSyncCoordinator::new(
            store.clone(),
            worker,
            Arc::new(hub.clone()),
            config.coordinator(),
        ));
        let (bus, rx) = EventBus::channel(config.bus_capacity);

        let state = Self {
            webhook_dedup: DedupGate::new(store.clone(), config.sync_dedup_ttl),
            config: Arc::new(config),
            store,
            memory_store,
            coordinator,
            bus,
            hub,
            rate_limiter: RateLimiter::new(),
            csrf_bypass: Arc::new(CsrfBypass::default()),
        };
        (state, rx)
    }
}

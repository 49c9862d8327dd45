//! Per-merchant catalog sync coordination
//!
//! - [`dedup`]: drop redelivered messages
//! - [`lock`]: one running sync per merchant
//! - [`worker`]: the catalog service boundary
//! - [`coordinator`]: the lifecycle tying them together

pub mod coordinator;
pub mod dedup;
pub mod lock;
pub mod worker;

pub use coordinator::{CatalogSyncCoordinator, CoordinatorConfig, FAILURE_FALLBACK, SyncOutcome};
pub use dedup::DedupGate;
pub use lock::{DistributedLock, LeaseGuard, LockLease};
pub use worker::{CatalogSync, HttpCatalogSync, SyncError};

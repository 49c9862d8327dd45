//! kleem-cloud: catalog sync coordination for the Kleem chatbot platform
//!
//! A merchant's product catalog is pulled from its store platform (Salla,
//! Zid, ...) by the catalog service. This crate decides *when* that happens:
//! it accepts sync requests from the dashboard and from platform webhooks,
//! drops redelivered messages, allows one running sync per merchant across
//! every instance, and tells the requesting user how it went.
//!
//! ```text
//! kleem-cloud/src/
//! ├── api/       # HTTP routes: health, sync trigger, webhooks, notification WS
//! ├── auth/      # CSRF, rate limiting, webhook signatures
//! ├── bus/       # In-process event bus and the sync consumer
//! ├── notify/    # Per-user notification hub
//! ├── store/     # KvStore: Redis and in-memory
//! ├── sync/      # Dedup gate, distributed lock, worker client, coordinator
//! ├── config.rs
//! ├── error.rs
//! ├── state.rs
//! └── tasks.rs   # Background tasks
//! ```

pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod notify;
pub mod state;
pub mod store;
pub mod sync;
pub mod tasks;

pub use config::Config;
pub use state::AppState;

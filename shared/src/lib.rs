//! Shared types for Kleem services
//!
//! Error types, the event bus envelope, the catalog sync message schema and
//! the notification model, used by the cloud service and its producers.

pub mod catalog;
pub mod error;
pub mod message;
pub mod notification;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use catalog::{SyncRequest, SyncRequestError, SyncResult};
pub use message::BusEnvelope;
pub use notification::{Notification, NotificationKind, Severity};

//! User notification delivery

mod hub;

pub use hub::{NotificationHub, RECENT_PER_USER};

use async_trait::async_trait;
use shared::Notification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: &str, notification: Notification)
    -> Result<(), NotifyError>;
}

//! NotificationHub: per-user notification fan-out
//!
//! ```text
//! CatalogSyncCoordinator
//!       │ notify_user(user_id, Notification)
//!       ▼
//! NotificationHub
//!   └── users: user_id → UserChannel
//!         ├── recent: last RECENT_PER_USER notifications (replayed on connect)
//!         └── tx: broadcast::Sender<Notification> (one per dashboard socket)
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use shared::Notification;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{Notifier, NotifyError};

/// Notifications replayed to a newly connected dashboard
pub const RECENT_PER_USER: usize = 20;

/// Enough to absorb a burst while a socket is writing
const BROADCAST_CAPACITY: usize = 64;

struct UserChannel {
    recent: VecDeque<Notification>,
    tx: broadcast::Sender<Notification>,
}

impl UserChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            recent: VecDeque::with_capacity(RECENT_PER_USER),
            tx,
        }
    }

    fn last_activity(&self) -> i64 {
        self.recent.back().map(|n| n.created_at).unwrap_or(0)
    }
}

/// In-process notifier; users are isolated by id
#[derive(Clone, Default)]
pub struct NotificationHub {
    users: Arc<DashMap<String, UserChannel>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache and broadcast a notification
    pub fn publish(&self, user_id: &str, notification: Notification) {
        let mut user = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserChannel::new);

        if user.recent.len() == RECENT_PER_USER {
            user.recent.pop_front();
        }
        user.recent.push_back(notification.clone());

        // No subscribers is fine: the user sees it in `recent` on next connect
        let _ = user.tx.send(notification);
    }

    /// Subscribe to a user's stream, returning the cached backlog too
    pub fn subscribe(&self, user_id: &str) -> (Vec<Notification>, broadcast::Receiver<Notification>) {
        let user = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserChannel::new);
        (user.recent.iter().cloned().collect(), user.tx.subscribe())
    }

    /// Cached notifications for a user, oldest first
    pub fn recent(&self, user_id: &str) -> Vec<Notification> {
        self.users
            .get(user_id)
            .map(|user| user.recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop users with no open socket and nothing newer than `cutoff_millis`
    pub fn prune_idle(&self, cutoff_millis: i64) -> usize {
        let before = self.users.len();
        self.users
            .retain(|_, user| user.tx.receiver_count() > 0 || user.last_activity() >= cutoff_millis);
        before - self.users.len()
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn notify_user(
        &self,
        user_id: &str,
        notification: Notification,
    ) -> Result<(), NotifyError> {
        tracing::debug!(
            user_id = %user_id,
            kind = %notification.kind,
            merchant_id = %notification.merchant_id,
            "Notify user"
        );
        self.publish(user_id, notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{NotificationKind, Severity};

    fn make(kind: NotificationKind, merchant_id: &str) -> Notification {
        Notification::new(kind, merchant_id, Severity::Info, "title", "body")
    }

    #[tokio::test]
    async fn subscriber_receives_published() {
        let hub = NotificationHub::new();
        let (backlog, mut rx) = hub.subscribe("u1");
        assert!(backlog.is_empty());

        hub.notify_user("u1", make(NotificationKind::CatalogSyncStarted, "m1"))
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, NotificationKind::CatalogSyncStarted);
        assert_eq!(got.merchant_id, "m1");
    }

    #[test]
    fn users_are_isolated() {
        let hub = NotificationHub::new();
        hub.publish("u1", make(NotificationKind::CatalogSyncStarted, "m1"));
        hub.publish("u2", make(NotificationKind::CatalogSyncFailed, "m2"));

        let u1 = hub.recent("u1");
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].merchant_id, "m1");

        let u2 = hub.recent("u2");
        assert_eq!(u2.len(), 1);
        assert_eq!(u2[0].kind, NotificationKind::CatalogSyncFailed);

        assert!(hub.recent("nobody").is_empty());
    }

    #[test]
    fn backlog_is_bounded_and_replayed() {
        let hub = NotificationHub::new();
        for i in 0..(RECENT_PER_USER + 5) {
            hub.publish("u1", make(NotificationKind::CatalogSyncStarted, &format!("m{i}")));
        }

        let (backlog, _rx) = hub.subscribe("u1");
        assert_eq!(backlog.len(), RECENT_PER_USER);
        assert_eq!(backlog[0].merchant_id, "m5");
        assert_eq!(
            backlog.last().unwrap().merchant_id,
            format!("m{}", RECENT_PER_USER + 4)
        );
    }

    #[test]
    fn prune_keeps_connected_users() {
        let hub = NotificationHub::new();
        hub.publish("offline", make(NotificationKind::CatalogSyncStarted, "m1"));
        let (_, _rx) = hub.subscribe("online");

        let removed = hub.prune_idle(i64::MAX);
        assert_eq!(removed, 1);
        assert!(hub.recent("offline").is_empty());
        assert_eq!(hub.users.len(), 1);
    }
}

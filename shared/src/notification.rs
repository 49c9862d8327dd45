//! User notifications pushed to the merchant dashboard

use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Notification type, serialized as its dotted name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "catalog.sync.already_running")]
    CatalogSyncAlreadyRunning,
    #[serde(rename = "catalog.sync.started")]
    CatalogSyncStarted,
    #[serde(rename = "catalog.sync.completed")]
    CatalogSyncCompleted,
    #[serde(rename = "catalog.sync.failed")]
    CatalogSyncFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogSyncAlreadyRunning => "catalog.sync.already_running",
            Self::CatalogSyncStarted => "catalog.sync.started",
            Self::CatalogSyncCompleted => "catalog.sync.completed",
            Self::CatalogSyncFailed => "catalog.sync.failed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub merchant_id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Creation time (Unix millis)
    pub created_at: i64,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        merchant_id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            merchant_id: merchant_id.into(),
            severity,
            data: None,
            created_at: crate::util::now_millis(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

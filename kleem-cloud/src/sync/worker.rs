//! Catalog sync worker boundary
//!
//! The actual import lives in the catalog service; this crate only sees it
//! through [`CatalogSync`]. [`HttpCatalogSync`] is the production client.

use async_trait::async_trait;
use shared::SyncResult;
use std::time::Duration;
use thiserror::Error;

/// Longest upstream error body kept in a failure message
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Worker-reported failure; the message is shown to the user as-is
    #[error("{0}")]
    Failed(String),
    #[error("catalog service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("catalog service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog sync timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

#[async_trait]
pub trait CatalogSync: Send + Sync {
    async fn sync_for_merchant(&self, merchant_id: &str) -> Result<SyncResult, SyncError>;
}

/// Calls `POST {base_url}/merchants/{id}/catalog/sync` on the catalog service
pub struct HttpCatalogSync {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalogSync {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn sync_url(&self, merchant_id: &str) -> String {
        format!("{}/merchants/{merchant_id}/catalog/sync", self.base_url)
    }
}

/// Pull a human-readable message out of an upstream error body
fn upstream_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_BODY {
        message.chars().take(MAX_ERROR_BODY).collect()
    } else {
        message
    }
}

#[async_trait]
impl CatalogSync for HttpCatalogSync {
    async fn sync_for_merchant(&self, merchant_id: &str) -> Result<SyncResult, SyncError> {
        let mut request = self.client.post(self.sync_url(merchant_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        Ok(response.json::<SyncResult>().await?)
    }
}

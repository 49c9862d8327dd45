//! Manual catalog sync trigger
//!
//! POST /api/merchants/{merchant_id}/catalog/sync        : enqueue a sync
//! GET  /api/merchants/{merchant_id}/catalog/sync/status : is one running

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shared::SyncRequest;
use shared::catalog::DEFAULT_SOURCE;
use shared::error::{ApiResponse, AppError};

use crate::error::ServiceResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncBody {
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Client-chosen id makes retries of the same click idempotent
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncResponse {
    pub message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub merchant_id: String,
    pub running: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_merchant_id(raw: String) -> Result<String, AppError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::new(shared::error::ErrorCode::MerchantIdRequired));
    }
    Ok(id.to_string())
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(merchant_id_raw): Path<String>,
    Json(body): Json<TriggerSyncBody>,
) -> Result<(StatusCode, ApiResponse<TriggerSyncResponse>), AppError> {
    let merchant_id = parse_merchant_id(merchant_id_raw)?;
    let requested_by = non_blank(body.requested_by).ok_or_else(|| {
        AppError::validation("requestedBy is required").with_detail("field", "requestedBy")
    })?;

    let request = SyncRequest {
        merchant_id,
        requested_by: Some(requested_by),
        source: non_blank(body.source).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        message_id: non_blank(body.message_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    };

    state.bus.publish(request.to_envelope()).await?;
    tracing::info!(
        merchant_id = %request.merchant_id,
        message_id = %request.message_id,
        source = %request.source,
        "Catalog sync requested"
    );

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::success(TriggerSyncResponse {
            message_id: request.message_id,
        }),
    ))
}

pub async fn sync_status(
    State(state): State<AppState>,
    Path(merchant_id_raw): Path<String>,
) -> ServiceResult<ApiResponse<SyncStatusResponse>> {
    let merchant_id = parse_merchant_id(merchant_id_raw)?;
    let running = state.coordinator.is_running(&merchant_id).await?;
    Ok(ApiResponse::success(SyncStatusResponse {
        merchant_id,
        running,
    }))
}

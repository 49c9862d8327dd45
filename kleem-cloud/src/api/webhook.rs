//! Platform webhook handler
//!
//! POST /webhooks/{provider}/{merchant_id}: raw body for signature verification

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use shared::SyncRequest;
use shared::error::{ApiResponse, AppError, ErrorCode};

use crate::auth::webhook_signature::{self, SIGNATURE_HEADER, SignatureError, WebhookTarget};
use crate::error::ServiceResult;
use crate::state::AppState;
use crate::sync::dedup;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Event id as a string; platforms send either strings or numbers
fn extract_event_id(event: &serde_json::Value) -> Option<String> {
    ["event_id", "id"].iter().find_map(|field| match event.get(*field) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Path segments are signed joined by `/`, so they must not contain one
fn target_segment(raw: &str, field: &'static str) -> Result<(), AppError> {
    if raw.trim().is_empty() || raw.contains('/') {
        return Err(AppError::validation(format!("{field} is invalid")).with_detail("field", field));
    }
    Ok(())
}

/// Handle an incoming platform webhook
///
/// Must receive raw body (not JSON) for HMAC signature verification.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path((provider, merchant_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<(StatusCode, ApiResponse<WebhookAck>)> {
    target_segment(&provider, "provider")?;
    target_segment(&merchant_id, "merchantId")?;

    // 1. Verify signature, bound to this provider and merchant
    let target = WebhookTarget {
        provider: &provider,
        merchant_id: &merchant_id,
    };
    let sig_header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = webhook_signature::verify_webhook_signature(
        &body,
        target,
        sig_header,
        &state.config.webhook_secret,
    ) {
        tracing::warn!(provider = %provider, merchant_id = %merchant_id, error = %e, "Webhook signature verification failed");
        let err = match e {
            SignatureError::Missing => AppError::new(ErrorCode::WebhookSignatureMissing),
            SignatureError::Malformed | SignatureError::Mismatch => {
                AppError::new(ErrorCode::WebhookSignatureInvalid)
            }
            SignatureError::Expired => AppError::with_message(
                ErrorCode::WebhookSignatureInvalid,
                "Webhook timestamp is outside the accepted window",
            ),
        };
        return Err(err.into());
    }

    // 2. Parse JSON event
    let event: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(%e, "Failed to parse webhook JSON");
        AppError::with_message(ErrorCode::InvalidFormat, "Webhook body must be JSON")
    })?;

    let Some(event_id) = extract_event_id(&event) else {
        tracing::warn!(provider = %provider, "Webhook event missing id");
        return Err(AppError::with_message(ErrorCode::RequiredField, "event_id is required")
            .with_detail("field", "event_id")
            .into());
    };

    // 3. Idempotency: mark first, the atomic SET NX decides the winner
    let key = dedup::webhook_key(&provider, &merchant_id, &event_id);
    if !state.webhook_dedup.check_and_mark(&key).await? {
        tracing::info!(provider = %provider, event_id = %event_id, "Duplicate webhook event, skipping");
        return Ok((
            StatusCode::OK,
            ApiResponse::success(WebhookAck {
                status: "duplicate_ignored",
                message_id: None,
            }),
        ));
    }

    // 4. Enqueue the sync
    let request = SyncRequest {
        merchant_id: merchant_id.clone(),
        requested_by: event
            .get("requested_by")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        source: provider.clone(),
        message_id: format!("webhook:{provider}:{event_id}"),
    };

    if let Err(e) = state.bus.publish(request.to_envelope()).await {
        // Let the platform's retry through
        if let Err(del_err) = state.store.del(&key).await {
            tracing::error!(key = %key, error = %del_err, "Failed to clear webhook dedup mark");
        }
        return Err(e.into());
    }

    tracing::info!(
        provider = %provider,
        merchant_id = %merchant_id,
        event_id = %event_id,
        "Webhook accepted, catalog sync requested"
    );
    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::success(WebhookAck {
            status: "accepted",
            message_id: Some(request.message_id),
        }),
    ))
}

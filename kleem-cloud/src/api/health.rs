//! Health check endpoint

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// GET /health
///
/// `redis` is `up`/`down`, or `disabled` when running on the in-memory store.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let backend = state.store.backend();
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend, error = %e, "Health check: store ping failed");
            false
        }
    };

    let redis = match (backend, store_ok) {
        ("redis", true) => "up",
        ("redis", false) => "down",
        _ => "disabled",
    };
    let (status, label) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(serde_json::json!({
            "status": label,
            "redis": redis,
            "service": "kleem-cloud",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

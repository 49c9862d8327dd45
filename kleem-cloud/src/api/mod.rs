//! API routes for kleem-cloud

pub mod catalog;
pub mod health;
pub mod notifications;
pub mod webhook;

use axum::routing::{get, post};
use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::csrf::{csrf_middleware, issue_token};
use crate::auth::rate_limit::{sync_rate_limit, webhook_rate_limit};
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Dashboard-triggered sync (CSRF protected, 3/min/IP)
    let catalog = Router::new()
        .route(
            "/api/merchants/{merchant_id}/catalog/sync",
            post(catalog::trigger_sync),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            sync_rate_limit,
        ))
        .route(
            "/api/merchants/{merchant_id}/catalog/sync/status",
            get(catalog::sync_status),
        );

    // Platform webhooks (signature-verified, raw body, 30/min/IP)
    let webhooks = Router::new()
        .route(
            "/webhooks/{provider}/{merchant_id}",
            post(webhook::handle_webhook),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_rate_limit,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/csrf-token", get(issue_token))
        .route(
            "/api/notifications/ws",
            get(notifications::handle_notifications_ws),
        )
        .merge(catalog)
        .merge(webhooks)
        .layer(middleware::from_fn_with_state(state.clone(), csrf_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
        .with_state(state)
}

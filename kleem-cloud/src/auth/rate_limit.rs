//! Application-layer rate limiting for sync trigger and webhook routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use shared::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Entries idle longer than this are dropped by [`RateLimiter::cleanup`]
const IDLE_CUTOFF: Duration = Duration::from_secs(300);

struct IpEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// route name -> (IP -> entry)
    inner: Arc<Mutex<HashMap<&'static str, HashMap<String, IpEntry>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(
        &self,
        route: &'static str,
        ip: &str,
        max_requests: u32,
        window: Duration,
    ) -> bool {
        let mut map = self.inner.lock().await;
        let route_map = map.entry(route).or_default();
        let now = Instant::now();

        let entry = route_map.entry(ip.to_owned()).or_insert_with(|| IpEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= max_requests
    }

    /// Remove idle entries, returning how many were dropped
    pub async fn cleanup(&self) -> usize {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        let mut removed = 0;

        for route_map in map.values_mut() {
            let before = route_map.len();
            route_map.retain(|_, entry| now.duration_since(entry.window_start) < IDLE_CUTOFF);
            removed += before - route_map.len();
        }

        map.retain(|_, route_map| !route_map.is_empty());
        removed
    }
}

/// Extract client IP: X-Forwarded-For header first, then peer address.
fn extract_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        // First entry is the original client
        if let Some(first) = val.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn limit(
    state: &crate::state::AppState,
    route: &'static str,
    max_requests: u32,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = extract_ip(&request);
    if !state
        .rate_limiter
        .check(route, &ip, max_requests, Duration::from_secs(60))
        .await
    {
        tracing::warn!(route, ip = %ip, "Rate limited");
        return Err(AppError::rate_limited());
    }
    Ok(next.run(request).await)
}

/// Manual catalog sync trigger: 3 requests/minute per IP
pub async fn sync_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    limit(&state, "catalog_sync", 3, request, next).await
}

/// Platform webhooks: 30 requests/minute per IP
pub async fn webhook_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    limit(&state, "webhook", 30, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn limits_within_window_then_resets() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("catalog_sync", "1.2.3.4", 3, MINUTE).await);
        }
        assert!(!limiter.check("catalog_sync", "1.2.3.4", 3, MINUTE).await);

        tokio::time::advance(MINUTE).await;
        assert!(limiter.check("catalog_sync", "1.2.3.4", 3, MINUTE).await);
    }

    #[tokio::test]
    async fn routes_and_ips_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("catalog_sync", "1.1.1.1", 1, MINUTE).await);
        assert!(!limiter.check("catalog_sync", "1.1.1.1", 1, MINUTE).await);

        assert!(limiter.check("catalog_sync", "2.2.2.2", 1, MINUTE).await);
        assert!(limiter.check("webhook", "1.1.1.1", 1, MINUTE).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_idle_entries() {
        let limiter = RateLimiter::new();
        limiter.check("webhook", "1.1.1.1", 30, MINUTE).await;
        assert_eq!(limiter.cleanup().await, 0);

        tokio::time::advance(IDLE_CUTOFF).await;
        assert_eq!(limiter.cleanup().await, 1);
        assert!(limiter.inner.lock().await.is_empty());
    }

    #[test]
    fn forwarded_for_wins() {
        let request = Request::builder()
            .header("x-forwarded-for", "9.9.9.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_ip(&request), "9.9.9.9");

        let request = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(extract_ip(&request), "unknown");
    }
}

//! CSRF protection
//!
//! Double-submit cookie: unsafe requests must echo the `_csrf` cookie in the
//! `x-csrf-token` header. Machine-to-machine routes (webhooks, OAuth
//! callbacks, health) are exempted through [`CsrfBypass`].

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use shared::error::{ApiResponse, AppError, ErrorCode};
use std::collections::HashSet;

use crate::state::AppState;

pub const CSRF_COOKIE: &str = "_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Paths exempted from CSRF checks
#[derive(Debug, Clone)]
pub struct CsrfBypass {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl CsrfBypass {
    pub fn new<E, P>(exact: E, prefixes: P) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `path` skips CSRF checks.
    ///
    /// Prefixes only match whole segments: `/webhooks` covers `/webhooks` and
    /// `/webhooks/salla` but not `/webhooks_backup`.
    pub fn matches(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        if self.exact.contains(path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for CsrfBypass {
    fn default() -> Self {
        Self::new(
            ["/health", "/api/csrf-token"],
            ["/webhooks", "/api/integrations/callback"],
        )
    }
}

fn is_unsafe(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Value of the named cookie, if present
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
}

/// Compare through HMAC digests so the check is constant time via `verify_slice`
fn tokens_match(cookie: &str, header: &str) -> bool {
    let digest = |value: &str| {
        Hmac::<Sha256>::new_from_slice(CSRF_COOKIE.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (digest(cookie), digest(header)) {
        (Ok(expected), Ok(actual)) => actual
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

fn check(headers: &HeaderMap) -> Result<(), AppError> {
    let cookie = cookie_value(headers, CSRF_COOKIE).filter(|v| !v.is_empty());
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    match (cookie, header) {
        (Some(cookie), Some(header)) if tokens_match(cookie, header) => Ok(()),
        (Some(_), Some(_)) => Err(AppError::new(ErrorCode::CsrfTokenInvalid)),
        _ => Err(AppError::new(ErrorCode::CsrfTokenMissing)),
    }
}

/// Reject unsafe requests without a matching CSRF token
pub async fn csrf_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.csrf_enabled
        || !is_unsafe(request.method())
        || state.csrf_bypass.matches(request.uri().path())
    {
        return Ok(next.run(request).await);
    }

    if let Err(e) = check(request.headers()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            code = %e.code,
            "CSRF check failed"
        );
        return Err(e);
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
    pub csrf_token: String,
}

/// GET /api/csrf-token
pub async fn issue_token() -> Response {
    let token = uuid::Uuid::new_v4().to_string();
    let cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict; Secure");

    let mut response = ApiResponse::success(CsrfToken { csrf_token: token }).into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "Invalid CSRF cookie header"),
    }
    response
}

//! Cloud service configuration

use std::time::Duration;

use crate::bus::DEFAULT_BUS_CAPACITY;
use crate::sync::CoordinatorConfig;
use crate::sync::dedup::DEDUP_TTL;
use crate::sync::lock::CATALOG_SYNC_LOCK_TTL;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cloud service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    /// Redis connection URL; `None` only in development (in-memory store)
    pub redis_url: Option<String>,
    /// Catalog service base URL
    pub catalog_service_url: String,
    /// Bearer token for the catalog service
    pub catalog_service_token: Option<String>,
    /// HMAC secret for platform webhooks
    pub webhook_secret: String,
    pub sync_lock_ttl: Duration,
    pub sync_dedup_ttl: Duration,
    /// Worker bound; defaults to the lock TTL
    pub sync_timeout: Duration,
    /// Max catalog syncs in flight
    pub consumer_concurrency: usize,
    pub bus_capacity: usize,
    pub csrf_enabled: bool,
    /// `json` for JSON log lines, anything else for the human format
    pub log_format: String,
}

impl Config {
    fn is_development(environment: &str) -> bool {
        environment == "development"
    }

    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &str,
        environment: &str,
    ) -> Result<String, BoxError> {
        let val = match lookup(name) {
            Some(v) => v,
            None => {
                if !Self::is_development(environment) {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && !Self::is_development(environment) {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn secs(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &str,
    ) -> Result<Option<Duration>, BoxError> {
        match lookup(name).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| format!("{name} must be a number of seconds, got {raw:?}"))?;
                if secs == 0 {
                    return Err(format!("{name} must be greater than zero").into());
                }
                Ok(Some(Duration::from_secs(secs)))
            }
        }
    }

    fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
        match lookup(name).as_deref().map(str::trim) {
            Some("0") | Some("false") | Some("off") | Some("no") => false,
            Some("1") | Some("true") | Some("on") | Some("yes") => true,
            _ => default,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".into());

        let redis_url = lookup("REDIS_URL").filter(|s| !s.is_empty());
        if redis_url.is_none() && !Self::is_development(&environment) {
            return Err(format!("REDIS_URL must be set in {environment} environment").into());
        }

        let sync_lock_ttl =
            Self::secs(&lookup, "SYNC_LOCK_TTL_SECS")?.unwrap_or(CATALOG_SYNC_LOCK_TTL);
        let sync_dedup_ttl = Self::secs(&lookup, "SYNC_DEDUP_TTL_SECS")?.unwrap_or(DEDUP_TTL);
        let sync_timeout = Self::secs(&lookup, "SYNC_TIMEOUT_SECS")?.unwrap_or(sync_lock_ttl);

        Ok(Self {
            http_port: lookup("HTTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis_url,
            catalog_service_url: lookup("CATALOG_SERVICE_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:3000".into()),
            catalog_service_token: lookup("CATALOG_SERVICE_TOKEN").filter(|s| !s.is_empty()),
            webhook_secret: Self::require_secret(&lookup, "WEBHOOK_SECRET", &environment)?,
            sync_lock_ttl,
            sync_dedup_ttl,
            sync_timeout,
            consumer_concurrency: lookup("CONSUMER_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(32),
            bus_capacity: lookup("BUS_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_BUS_CAPACITY),
            csrf_enabled: Self::flag(&lookup, "CSRF_ENABLED", true),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".into()),
            environment,
        })
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            lock_ttl: self.sync_lock_ttl,
            dedup_ttl: self.sync_dedup_ttl,
            sync_timeout: self.sync_timeout,
        }
    }
}

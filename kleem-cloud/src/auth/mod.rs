//! Request guards: CSRF, rate limiting, webhook signatures

pub mod csrf;
pub mod rate_limit;
pub mod webhook_signature;

pub use csrf::CsrfBypass;
pub use rate_limit::RateLimiter;

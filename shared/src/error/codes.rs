//! Unified error codes for Kleem services
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors (CSRF, webhook signatures)
//! - 2xxx: Permission errors
//! - 3xxx: Merchant errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the dashboard and the
/// storefront can switch on them without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Auth ====================
    /// CSRF token missing from request
    CsrfTokenMissing = 1010,
    /// CSRF token does not match the cookie
    CsrfTokenInvalid = 1011,
    /// Webhook signature header missing
    WebhookSignatureMissing = 1020,
    /// Webhook signature does not verify
    WebhookSignatureInvalid = 1021,

    // ==================== 2xxx: Permission ====================
    /// Too many requests from this client
    RateLimited = 2002,

    // ==================== 3xxx: Merchant ====================
    /// Merchant id is required
    MerchantIdRequired = 3001,

    // ==================== 9xxx: System ====================
    /// Key-value store unavailable
    StoreUnavailable = 9002,
    /// Event bus is closed or full
    BusUnavailable = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",

            // Auth
            ErrorCode::CsrfTokenMissing => "CSRF token is missing",
            ErrorCode::CsrfTokenInvalid => "CSRF token is invalid",
            ErrorCode::WebhookSignatureMissing => "Webhook signature is missing",
            ErrorCode::WebhookSignatureInvalid => "Webhook signature is invalid",

            // Permission
            ErrorCode::RateLimited => "Too many requests, try again later",

            // Merchant
            ErrorCode::MerchantIdRequired => "Merchant id is required",

            // System
            ErrorCode::StoreUnavailable => "Key-value store unavailable",
            ErrorCode::BusUnavailable => "Event bus unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),

            // Auth
            1010 => Ok(ErrorCode::CsrfTokenMissing),
            1011 => Ok(ErrorCode::CsrfTokenInvalid),
            1020 => Ok(ErrorCode::WebhookSignatureMissing),
            1021 => Ok(ErrorCode::WebhookSignatureInvalid),

            // Permission
            2002 => Ok(ErrorCode::RateLimited),

            // Merchant
            3001 => Ok(ErrorCode::MerchantIdRequired),

            // System
            9002 => Ok(ErrorCode::StoreUnavailable),
            9004 => Ok(ErrorCode::BusUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

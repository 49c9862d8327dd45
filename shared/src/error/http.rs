//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::WebhookSignatureMissing | Self::WebhookSignatureInvalid => {
                StatusCode::UNAUTHORIZED
            }

            Self::CsrfTokenMissing | Self::CsrfTokenInvalid => StatusCode::FORBIDDEN,

            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::StoreUnavailable | Self::BusUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // 400 Bad Request (validation errors)
            Self::ValidationFailed
            | Self::InvalidFormat
            | Self::RequiredField
            | Self::MerchantIdRequired => StatusCode::BAD_REQUEST,
        }
    }
}

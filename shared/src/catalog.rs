//! Catalog sync message schema
//!
//! Inbound `catalog.sync` / `requested` payloads are validated here, at the
//! bus boundary, so the coordinator only ever sees a well-formed
//! [`SyncRequest`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{BusEnvelope, EVENT_REQUESTED, TOPIC_CATALOG_SYNC};

/// Source used when the producer does not say where the request came from
pub const DEFAULT_SOURCE: &str = "manual";

/// A validated catalog sync request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub merchant_id: String,
    /// User to notify; absent for system-originated requests
    pub requested_by: Option<String>,
    /// Source platform (e.g. "salla", "zid", "manual")
    pub source: String,
    /// De-duplication identity
    pub message_id: String,
}

/// Why an envelope could not be turned into a [`SyncRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncRequestError {
    #[error("unexpected event {topic}.{event}")]
    UnexpectedEvent { topic: String, event: String },
    #[error("payload is not a JSON object")]
    InvalidPayload,
    #[error("merchantId is missing")]
    MissingMerchantId,
}

/// Raw wire payload, accepted in camelCase or snake_case
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSyncPayload {
    #[serde(default, alias = "merchant_id")]
    merchant_id: Option<String>,
    #[serde(default, alias = "requested_by")]
    requested_by: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SyncRequest {
    /// Validate a bus envelope.
    ///
    /// The message id comes from `headers.messageId`, then the envelope `id`,
    /// then `"{merchantId}:{timestamp}"` using the envelope publish time, so a
    /// redelivered envelope without ids still maps to the same identity.
    pub fn from_envelope(envelope: &BusEnvelope) -> Result<Self, SyncRequestError> {
        if !envelope.is(TOPIC_CATALOG_SYNC, EVENT_REQUESTED) {
            return Err(SyncRequestError::UnexpectedEvent {
                topic: envelope.topic.clone(),
                event: envelope.event.clone(),
            });
        }
        if !envelope.payload.is_object() {
            return Err(SyncRequestError::InvalidPayload);
        }

        let raw: RawSyncPayload = envelope
            .parse_payload()
            .map_err(|_| SyncRequestError::InvalidPayload)?;

        let merchant_id =
            non_blank(raw.merchant_id).ok_or(SyncRequestError::MissingMerchantId)?;

        let message_id = envelope
            .message_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{merchant_id}:{}", envelope.timestamp));

        Ok(Self {
            requested_by: non_blank(raw.requested_by),
            source: non_blank(raw.source).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            merchant_id,
            message_id,
        })
    }

    /// Build the bus envelope carrying this request
    pub fn to_envelope(&self) -> BusEnvelope {
        BusEnvelope::catalog_sync_requested(serde_json::json!({
            "merchantId": self.merchant_id,
            "requestedBy": self.requested_by,
            "source": self.source,
        }))
        .with_message_id(self.message_id.clone())
    }
}

/// Outcome reported by the sync worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub imported: u64,
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requested(payload: serde_json::Value) -> BusEnvelope {
        BusEnvelope::catalog_sync_requested(payload).with_timestamp(1_700_000_000_000)
    }

    #[test]
    fn parses_full_payload() {
        let env = requested(json!({"merchantId": "m1", "requestedBy": "u1", "source": "salla"}))
            .with_message_id("abc");
        let req = SyncRequest::from_envelope(&env).unwrap();
        assert_eq!(
            req,
            SyncRequest {
                merchant_id: "m1".into(),
                requested_by: Some("u1".into()),
                source: "salla".into(),
                message_id: "abc".into(),
            }
        );
    }

    #[test]
    fn accepts_snake_case_fields() {
        let env = requested(json!({"merchant_id": "m2", "requested_by": "u2"})).with_id("b-9");
        let req = SyncRequest::from_envelope(&env).unwrap();
        assert_eq!(req.merchant_id, "m2");
        assert_eq!(req.requested_by.as_deref(), Some("u2"));
        assert_eq!(req.source, DEFAULT_SOURCE);
        assert_eq!(req.message_id, "b-9");
    }

    #[test]
    fn falls_back_to_merchant_and_timestamp() {
        let env = requested(json!({"merchantId": "m1"}));
        let req = SyncRequest::from_envelope(&env).unwrap();
        assert_eq!(req.message_id, "m1:1700000000000");
        assert!(req.requested_by.is_none());
    }

    #[test]
    fn missing_or_blank_merchant_is_rejected() {
        let missing = requested(json!({"requestedBy": "u1"}));
        assert_eq!(
            SyncRequest::from_envelope(&missing),
            Err(SyncRequestError::MissingMerchantId)
        );

        let blank = requested(json!({"merchantId": "   "}));
        assert_eq!(
            SyncRequest::from_envelope(&blank),
            Err(SyncRequestError::MissingMerchantId)
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let env = requested(json!("m1"));
        assert_eq!(
            SyncRequest::from_envelope(&env),
            Err(SyncRequestError::InvalidPayload)
        );

        let wrong_type = requested(json!({"merchantId": 42}));
        assert_eq!(
            SyncRequest::from_envelope(&wrong_type),
            Err(SyncRequestError::InvalidPayload)
        );
    }

    #[test]
    fn other_events_are_rejected() {
        let env = BusEnvelope::new("catalog.sync", "completed", json!({"merchantId": "m1"}));
        assert!(matches!(
            SyncRequest::from_envelope(&env),
            Err(SyncRequestError::UnexpectedEvent { .. })
        ));
    }

    #[test]
    fn to_envelope_parses_back() {
        let req = SyncRequest {
            merchant_id: "m1".into(),
            requested_by: Some("u1".into()),
            source: "zid".into(),
            message_id: "abc".into(),
        };
        let parsed = SyncRequest::from_envelope(&req.to_envelope()).unwrap();
        assert_eq!(parsed, req);
    }
}

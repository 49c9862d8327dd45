//! Event bus envelope shared by the service and its producers
//!
//! Every event travelling on the bus is a [`BusEnvelope`]: a topic, an event
//! name inside that topic, string headers and a JSON payload. Consumers pick
//! the envelopes they understand by `(topic, event)` and parse the payload
//! into their own typed schema.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Catalog sync topic
pub const TOPIC_CATALOG_SYNC: &str = "catalog.sync";
/// Event emitted when a catalog sync is requested
pub const EVENT_REQUESTED: &str = "requested";
/// Header carrying the producer-assigned message id
pub const HEADER_MESSAGE_ID: &str = "messageId";

/// Envelope for a single bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEnvelope {
    /// Broker-assigned id (optional, not every producer sets it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Publish time (Unix millis)
    pub timestamp: i64,
}

impl BusEnvelope {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            event: event.into(),
            headers: HashMap::new(),
            payload,
            timestamp: crate::util::now_millis(),
        }
    }

    /// Envelope for `catalog.sync` / `requested`
    pub fn catalog_sync_requested(payload: serde_json::Value) -> Self {
        Self::new(TOPIC_CATALOG_SYNC, EVENT_REQUESTED, payload)
    }

    /// Set the broker id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the `messageId` header
    pub fn with_message_id(self, message_id: impl Into<String>) -> Self {
        self.with_header(HEADER_MESSAGE_ID, message_id)
    }

    /// Override the publish timestamp
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Message identity for de-duplication: `headers.messageId`, then `id`.
    ///
    /// Blank values count as absent.
    pub fn message_id(&self) -> Option<&str> {
        self.headers
            .get(HEADER_MESSAGE_ID)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.trim().is_empty()))
    }

    /// Whether this envelope is `topic` / `event`
    pub fn is(&self, topic: &str, event: &str) -> bool {
        self.topic == topic && self.event == event
    }

    /// Parse the payload into a typed value
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

impl fmt::Display for BusEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.topic, self.event)?;
        if let Some(id) = self.message_id() {
            write!(f, "#{id}")?;
        }
        Ok(())
    }
}

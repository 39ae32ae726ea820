use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

/// The inbound event contract, one per underlying change. `event_id` is
/// derived from the source change's own unique identifier, so physical
/// redelivery never creates a second logical event.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[validate(length(min = 1))]
    pub event_id: String,
    #[validate(length(min = 1))]
    pub source_collection: String,
    #[validate(length(min = 1))]
    pub source_document_id: String,
    pub change_type: ChangeType,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub attempt_count: u16,
}

impl Envelope {
    pub fn to_payload<D: DeserializeOwned>(&self) -> Result<D> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn payload<P: Serialize>(mut self, value: P) -> Result<Self> {
        self.payload = serde_json::to_value(&value)?;

        Ok(self)
    }
}

/// An envelope handed back to the consumer, with the queue's own redelivery
/// count for this message. Must be settled with `ack` or `nack`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    pub redelivery_count: u16,
}

/// A permanently failed envelope parked on the companion topic until an
/// operator recovers or discards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u16,
}

impl DeadLetter {
    pub fn new(envelope: Envelope, failure_reason: impl Into<String>) -> Self {
        let retry_count = envelope.attempt_count;

        Self {
            envelope,
            failure_reason: failure_reason.into(),
            failed_at: Utc::now(),
            retry_count,
        }
    }
}

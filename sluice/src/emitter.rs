use chrono::{DateTime, Utc};
use serde_json::Value;
use sluice_mq::{ChangeType, Envelope, Queue};
use tracing::debug;

use crate::error::Result;

/// One create/update/delete notification from the primary store's change
/// stream. `change_seq` is the store's own unique identifier for the change.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub change_seq: String,
    pub collection: String,
    pub document_id: String,
    pub kind: ChangeType,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

/// Converts primary-store mutations into envelopes on the durable queue.
///
/// The `event_id` is derived from the change's own identifier, never
/// generated, so redelivery of the same underlying change collapses into one
/// logical event. Publish failures propagate to the change stream's own
/// retry; there is no business retry here.
#[derive(Clone)]
pub struct ChangeCapture {
    queue: Queue,
}

impl ChangeCapture {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    pub async fn observe(&self, change: ChangeNotification) -> Result<()> {
        let envelope = Envelope {
            event_id: format!("{}:{}", change.collection, change.change_seq),
            source_collection: change.collection,
            source_document_id: change.document_id,
            change_type: change.kind,
            payload: change.payload,
            occurred_at: change.occurred_at,
            attempt_count: 0,
        };

        debug!(
            "captured {} change {}",
            envelope.change_type.as_str(),
            envelope.event_id
        );

        self.queue.publish(envelope).await?;

        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use sluice_mq::Envelope;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Retrying,
    Failed,
    Recovered,
    Discarded,
    Purged,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Retrying => "retrying",
            AuditStatus::Failed => "failed",
            AuditStatus::Recovered => "recovered",
            AuditStatus::Discarded => "discarded",
            AuditStatus::Purged => "purged",
        }
    }
}

/// One immutable record of a pipeline decision. Per processed message there
/// is exactly one terminal `Success`/`Failed` entry, preceded by zero or more
/// `Retrying` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub event_id: String,
    pub status: AuditStatus,
    pub retry_count: u16,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AuditEntry {
    fn entry(
        event_id: impl Into<String>,
        status: AuditStatus,
        retry_count: u16,
        error_message: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: event_id.into(),
            status,
            retry_count,
            error_message,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn success(envelope: &Envelope, started_at: DateTime<Utc>) -> Self {
        Self::entry(
            &envelope.event_id,
            AuditStatus::Success,
            envelope.attempt_count,
            None,
            started_at,
        )
    }

    pub fn retrying(envelope: &Envelope, error: &PipelineError, started_at: DateTime<Utc>) -> Self {
        Self::entry(
            &envelope.event_id,
            AuditStatus::Retrying,
            envelope.attempt_count,
            Some(error.to_string()),
            started_at,
        )
    }

    pub fn failed(envelope: &Envelope, error: &PipelineError, started_at: DateTime<Utc>) -> Self {
        Self::entry(
            &envelope.event_id,
            AuditStatus::Failed,
            envelope.attempt_count,
            Some(error.to_string()),
            started_at,
        )
    }

    pub fn recovered(event_id: impl Into<String>, recovered_by: &str) -> Self {
        let now = Utc::now();

        Self::entry(
            event_id,
            AuditStatus::Recovered,
            0,
            Some(format!("recovered by {recovered_by}")),
            now,
        )
    }

    pub fn discarded(event_id: impl Into<String>, discarded_by: &str) -> Self {
        let now = Utc::now();

        Self::entry(
            event_id,
            AuditStatus::Discarded,
            0,
            Some(format!("discarded by {discarded_by}")),
            now,
        )
    }

    pub fn purged(partition: NaiveDate, rows: u64) -> Self {
        let now = Utc::now();

        Self::entry(
            format!("partition:{partition}"),
            AuditStatus::Purged,
            0,
            Some(format!("{rows} rows purged")),
            now,
        )
    }
}

/// Append-only persistence for audit entries.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    async fn by_event_id(&self, event_id: &'_ str) -> Result<Vec<AuditEntry>>;

    async fn all(&self) -> Result<Vec<AuditEntry>>;
}

dyn_clone::clone_trait_object!(Engine);

/// The compliance trail. `append` is the only mutation; entries are immutable
/// once written.
#[derive(Clone)]
pub struct AuditRecorder {
    engine: Box<dyn Engine>,
}

impl AuditRecorder {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.engine.append(entry).await
    }

    pub async fn by_event_id(&self, event_id: impl Into<String>) -> Result<Vec<AuditEntry>> {
        self.engine.by_event_id(event_id.into().as_str()).await
    }

    pub async fn all(&self) -> Result<Vec<AuditEntry>> {
        self.engine.all().await
    }
}

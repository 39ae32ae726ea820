use serde::{Deserialize, Serialize};
use sluice_mq::Queue;
use tracing::info;

use crate::{
    audit::{AuditEntry, AuditRecorder},
    error::{PipelineError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Service,
}

/// Caller identity for the recovery surface. Only operators may touch the
/// dead-letter topic.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub subject: String,
    pub role: Role,
}

impl Credentials {
    pub fn operator(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: Role::Operator,
        }
    }

    pub fn service(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: Role::Service,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recovered {
    pub recovered: bool,
}

/// Operator-triggered reprocessing of dead-lettered messages.
///
/// Recovery re-enters the normal queue, so the worker's idempotent upsert
/// makes `recover` safe to call any number of times for the same `event_id`,
/// including concurrently.
#[derive(Clone)]
pub struct RecoveryService {
    queue: Queue,
    audit: AuditRecorder,
}

impl RecoveryService {
    pub fn new(queue: Queue, audit: AuditRecorder) -> Self {
        Self { queue, audit }
    }

    fn authorize(&self, credentials: &Credentials) -> Result<()> {
        if credentials.role != Role::Operator {
            return Err(PipelineError::Authorization(format!(
                "{} may not manage dead letters",
                credentials.subject
            )));
        }

        Ok(())
    }

    pub async fn recover(
        &self,
        event_id: impl Into<String>,
        credentials: &Credentials,
    ) -> Result<Recovered> {
        self.authorize(credentials)?;

        let event_id = event_id.into();

        let Some(letter) = self.queue.find_dead_letter(&event_id).await? else {
            return Err(PipelineError::NotFound(format!(
                "no dead letter for {event_id}"
            )));
        };

        let mut envelope = letter.envelope;
        envelope.attempt_count = 0;

        // removal only after the re-publish succeeded; a crash in between
        // leaves the letter in place and recovery can simply run again
        self.queue.publish(envelope).await?;
        self.queue.remove_dead_letter(&event_id).await?;

        self.audit
            .append(AuditEntry::recovered(&event_id, &credentials.subject))
            .await?;

        info!("{} recovered by {}", event_id, credentials.subject);

        Ok(Recovered { recovered: true })
    }

    pub async fn discard(
        &self,
        event_id: impl Into<String>,
        credentials: &Credentials,
    ) -> Result<()> {
        self.authorize(credentials)?;

        let event_id = event_id.into();

        if self.queue.discard_dead_letter(&event_id).await?.is_none() {
            return Err(PipelineError::NotFound(format!(
                "no dead letter for {event_id}"
            )));
        }

        self.audit
            .append(AuditEntry::discarded(&event_id, &credentials.subject))
            .await?;

        info!("{} discarded by {}", event_id, credentials.subject);

        Ok(())
    }
}

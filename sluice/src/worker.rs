use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use sluice_mq::{ChangeType, DeadLetter, Delivery, Envelope, Queue};
use sluice_warehouse::{Warehouse, WarehouseRow};
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info};
use validator::Validate;

use crate::{
    alert::{Alert, AlertSink},
    audit::{AuditEntry, AuditRecorder},
    config::PipelineConfig,
    error::{PipelineError, Result},
    pseudonym::Pseudonymizer,
};

/// Consumes envelopes, pseudonymizes the subject, and upserts warehouse rows.
///
/// Each delivery ends in exactly one of: ack-success, requeue-for-retry, or
/// ack-and-dead-letter. Retries sleep locally to the in-flight message, so a
/// backing-off message never stalls the rest of the batch.
#[derive(Clone)]
pub struct TransformWorker {
    queue: Queue,
    warehouse: Warehouse,
    audit: AuditRecorder,
    alerts: Box<dyn AlertSink>,
    pseudonymizer: Pseudonymizer,
    config: PipelineConfig,
}

impl TransformWorker {
    pub fn new(
        queue: Queue,
        warehouse: Warehouse,
        audit: AuditRecorder,
        alerts: Box<dyn AlertSink>,
        pseudonymizer: Pseudonymizer,
        config: PipelineConfig,
    ) -> Self {
        Self {
            queue,
            warehouse,
            audit,
            alerts,
            pseudonymizer,
            config,
        }
    }

    /// Spawn the consumer loop. A message-level failure never crashes the
    /// loop; engine-level receive failures are logged and retried on the next
    /// tick.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();

        tokio::spawn(async move {
            info!("transform worker started");

            let mut interval = interval_at(Instant::now(), worker.config.poll_interval);

            loop {
                interval.tick().await;

                let deliveries = match worker.queue.receive(worker.config.receive_batch_size).await
                {
                    Ok(deliveries) => deliveries,
                    Err(e) => {
                        error!("{e}");
                        continue;
                    }
                };

                let futures = deliveries
                    .into_iter()
                    .map(|delivery| worker.handle(delivery));

                join_all(futures).await;
            }
        })
    }

    pub async fn handle(&self, delivery: Delivery) {
        let event_id = delivery.envelope.event_id.to_owned();

        // a message that cannot be settled at all (audit or queue client
        // failure) goes back for redelivery instead of being lost
        if let Err(e) = self.settle(delivery.envelope).await {
            error!("{e}");

            if let Err(e) = self.queue.nack(&event_id).await {
                error!("{e}");
            }
        }
    }

    /// Drive one envelope to a terminal outcome against the retry budget.
    async fn settle(&self, mut envelope: Envelope) -> Result<()> {
        let started_at = Utc::now();
        let mut backoff = self.config.retry_initial_backoff;

        loop {
            let error = match self.process(&envelope).await {
                Ok(()) => {
                    self.audit
                        .append(AuditEntry::success(&envelope, started_at))
                        .await?;
                    self.queue.ack(&envelope.event_id).await?;

                    debug!("processed {}", envelope.event_id);

                    return Ok(());
                }
                Err(e) => e,
            };

            if error.is_retryable() && envelope.attempt_count + 1 < self.config.max_attempts {
                envelope.attempt_count += 1;
                self.audit
                    .append(AuditEntry::retrying(&envelope, &error, started_at))
                    .await?;

                debug!(
                    "retrying {} (attempt {}) after {backoff:?}: {error}",
                    envelope.event_id, envelope.attempt_count
                );

                sleep(backoff).await;
                backoff *= 2;

                continue;
            }

            self.audit
                .append(AuditEntry::failed(&envelope, &error, started_at))
                .await?;
            self.queue
                .dead_letter(DeadLetter::new(envelope.clone(), error.to_string()))
                .await?;
            self.alerts
                .alert(Alert::worker(&envelope.event_id, error.to_string()));
            self.queue.ack(&envelope.event_id).await?;

            error!(
                "dead-lettered {} after {} attempts: {error}",
                envelope.event_id,
                envelope.attempt_count + 1
            );

            return Ok(());
        }
    }

    /// One processing attempt: validate, pseudonymize, upsert.
    async fn process(&self, envelope: &Envelope) -> Result<()> {
        envelope
            .validate()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        if envelope.change_type == ChangeType::Delete {
            self.warehouse
                .soft_delete(&envelope.source_document_id, envelope.occurred_at)
                .await?;

            return Ok(());
        }

        let row = self.to_row(envelope)?;
        self.warehouse.upsert(vec![row]).await?;

        Ok(())
    }

    fn to_row(&self, envelope: &Envelope) -> Result<WarehouseRow> {
        let Value::Object(mut fields) = envelope.payload.clone() else {
            return Err(PipelineError::Validation(format!(
                "payload of {} is not an object",
                envelope.event_id
            )));
        };

        // hash the raw subject and strip it from what gets stored
        let raw_subject = match fields.remove(&self.config.subject_field) {
            Some(Value::String(subject)) => subject,
            Some(other) => {
                return Err(PipelineError::Validation(format!(
                    "subject field `{}` of {} is not a string: {other}",
                    self.config.subject_field, envelope.event_id
                )));
            }
            None => envelope.source_document_id.to_owned(),
        };

        Ok(WarehouseRow {
            event_id: envelope.event_id.to_owned(),
            subject_hash: self.pseudonymizer.subject_hash(&raw_subject),
            source_collection: envelope.source_collection.to_owned(),
            source_document_id: envelope.source_document_id.to_owned(),
            fields: Value::Object(fields),
            partition_date: envelope.occurred_at.date_naive(),
            occurred_at: envelope.occurred_at,
            ..WarehouseRow::default()
        })
    }
}

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde_json::json;
use sluice::{
    audit::Memory as AuditMemory, Alert, AlertSink, AuditRecorder, AuditStatus, ChangeCapture,
    ConfigBuilder, PipelineConfig, Pseudonymizer, RecoveryService, SubjectSalt, TransformWorker,
};
use sluice_mq::{ChangeType, Envelope, Memory as MqMemory, Queue};
use sluice_warehouse::{
    AggregateRow, Engine as WarehouseEngine, Memory as WarehouseMemory, Warehouse, WarehouseError,
    WarehouseRow,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tokio::time::{sleep, Duration as TokioDuration};

pub const SALT: &str = "test-salt";

#[derive(Debug, Clone, Default)]
pub struct CollectingAlerts(Arc<RwLock<Vec<Alert>>>);

impl CollectingAlerts {
    pub fn all(&self) -> Vec<Alert> {
        self.0.read().clone()
    }
}

impl AlertSink for CollectingAlerts {
    fn alert(&self, alert: Alert) {
        self.0.write().push(alert);
    }
}

/// Warehouse engine that fails a budgeted number of operations before
/// behaving, standing in for a flaky downstream store.
#[derive(Debug, Clone)]
pub struct FlakyWarehouse {
    inner: WarehouseMemory,
    failing_upserts: Arc<AtomicU32>,
    failing_aggregates: Arc<AtomicU32>,
    failing_partition: Option<NaiveDate>,
}

impl FlakyWarehouse {
    pub fn upserts(failures: u32) -> Self {
        Self {
            inner: WarehouseMemory::default(),
            failing_upserts: Arc::new(AtomicU32::new(failures)),
            failing_aggregates: Arc::new(AtomicU32::new(0)),
            failing_partition: None,
        }
    }

    pub fn aggregates(failures: u32) -> Self {
        Self {
            inner: WarehouseMemory::default(),
            failing_upserts: Arc::new(AtomicU32::new(0)),
            failing_aggregates: Arc::new(AtomicU32::new(failures)),
            failing_partition: None,
        }
    }

    pub fn partition(partition: NaiveDate) -> Self {
        Self {
            inner: WarehouseMemory::default(),
            failing_upserts: Arc::new(AtomicU32::new(0)),
            failing_aggregates: Arc::new(AtomicU32::new(0)),
            failing_partition: Some(partition),
        }
    }

    pub fn set_failing_aggregates(&self, failures: u32) {
        self.failing_aggregates.store(failures, Ordering::SeqCst);
    }

    fn take(budget: &AtomicU32) -> bool {
        let remaining = budget.load(Ordering::SeqCst);

        if remaining == 0 {
            return false;
        }

        budget.store(remaining - 1, Ordering::SeqCst);

        true
    }

    fn unavailable() -> WarehouseError {
        WarehouseError::Any(anyhow!("warehouse unavailable"))
    }
}

#[async_trait]
impl WarehouseEngine for FlakyWarehouse {
    async fn upsert(&self, rows: Vec<WarehouseRow>) -> sluice_warehouse::Result<()> {
        if Self::take(&self.failing_upserts) {
            return Err(Self::unavailable());
        }

        self.inner.upsert(rows).await
    }

    async fn get(&self, event_id: &'_ str) -> sluice_warehouse::Result<Option<WarehouseRow>> {
        self.inner.get(event_id).await
    }

    async fn partitions(&self) -> sluice_warehouse::Result<Vec<NaiveDate>> {
        self.inner.partitions().await
    }

    async fn rows_in_partition(
        &self,
        partition: NaiveDate,
        include_deleted: bool,
    ) -> sluice_warehouse::Result<Vec<WarehouseRow>> {
        self.inner.rows_in_partition(partition, include_deleted).await
    }

    async fn soft_delete(
        &self,
        source_document_id: &'_ str,
        deleted_at: DateTime<Utc>,
    ) -> sluice_warehouse::Result<u64> {
        self.inner.soft_delete(source_document_id, deleted_at).await
    }

    async fn purge_soft_deleted(
        &self,
        partition: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> sluice_warehouse::Result<u64> {
        if self.failing_partition == Some(partition) {
            return Err(Self::unavailable());
        }

        self.inner.purge_soft_deleted(partition, cutoff).await
    }

    async fn purge_partition(&self, partition: NaiveDate) -> sluice_warehouse::Result<u64> {
        if self.failing_partition == Some(partition) {
            return Err(Self::unavailable());
        }

        self.inner.purge_partition(partition).await
    }

    async fn replace_aggregates(
        &self,
        period_key: &'_ str,
        rows: Vec<AggregateRow>,
    ) -> sluice_warehouse::Result<()> {
        if Self::take(&self.failing_aggregates) {
            return Err(Self::unavailable());
        }

        self.inner.replace_aggregates(period_key, rows).await
    }

    async fn aggregates(&self, period_key: &'_ str) -> sluice_warehouse::Result<Vec<AggregateRow>> {
        self.inner.aggregates(period_key).await
    }
}

pub struct Pipeline {
    pub queue: Queue,
    pub warehouse: Warehouse,
    pub audit: AuditRecorder,
    pub alerts: CollectingAlerts,
    pub worker: TransformWorker,
    pub emitter: ChangeCapture,
    pub recovery: RecoveryService,
}

pub fn config() -> PipelineConfig {
    ConfigBuilder::new()
        .retry_initial_backoff(TokioDuration::from_millis(10))
        .poll_interval(TokioDuration::from_millis(20))
        .build()
}

pub fn pipeline_over<E: WarehouseEngine + 'static>(engine: E) -> Pipeline {
    let queue = MqMemory::queue();
    let warehouse = Warehouse::new(engine);
    let audit = AuditMemory::recorder();
    let alerts = CollectingAlerts::default();

    let worker = TransformWorker::new(
        queue.clone(),
        warehouse.clone(),
        audit.clone(),
        Box::new(alerts.clone()),
        Pseudonymizer::new(SubjectSalt::new(SALT)),
        config(),
    );

    Pipeline {
        emitter: ChangeCapture::new(queue.clone()),
        recovery: RecoveryService::new(queue.clone(), audit.clone()),
        queue,
        warehouse,
        audit,
        alerts,
        worker,
    }
}

pub fn pipeline() -> Pipeline {
    pipeline_over(WarehouseMemory::default())
}

pub fn envelope(event_id: &str, document_id: &str, score: i64) -> Envelope {
    Envelope {
        event_id: event_id.to_owned(),
        source_collection: "results".to_owned(),
        source_document_id: document_id.to_owned(),
        change_type: ChangeType::Create,
        payload: json!({ "subject_id": "user-1", "score": score }),
        occurred_at: Utc::now(),
        attempt_count: 0,
    }
}

pub async fn settled() {
    sleep(TokioDuration::from_millis(300)).await;
}

pub fn statuses(entries: &[sluice::AuditEntry]) -> Vec<AuditStatus> {
    entries.iter().map(|entry| entry.status).collect()
}

pub fn seeded_row(
    event_id: &str,
    document_id: &str,
    partition: NaiveDate,
    score: i64,
) -> WarehouseRow {
    WarehouseRow {
        event_id: event_id.to_owned(),
        subject_hash: Pseudonymizer::new(SubjectSalt::new(SALT)).subject_hash("user-1"),
        source_collection: "results".to_owned(),
        source_document_id: document_id.to_owned(),
        fields: json!({ "score": score }),
        partition_date: partition,
        occurred_at: partition.and_hms_opt(8, 0, 0).unwrap().and_utc(),
        ..WarehouseRow::default()
    }
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> NaiveDate {
    (now - Duration::days(days)).date_naive()
}

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    engine::Engine,
    error::Result,
    row::{AggregateRow, WarehouseRow},
};

/// Client handle over a warehouse [`Engine`]. All mutation goes through
/// idempotent upsert-by-key or per-partition deletes; there is no
/// read-modify-write path.
#[derive(Clone)]
pub struct Warehouse {
    engine: Box<dyn Engine>,
}

impl Warehouse {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub async fn upsert(&self, rows: Vec<WarehouseRow>) -> Result<()> {
        self.engine.upsert(rows).await
    }

    pub async fn get(&self, event_id: impl Into<String>) -> Result<Option<WarehouseRow>> {
        self.engine.get(event_id.into().as_str()).await
    }

    pub async fn partitions(&self) -> Result<Vec<NaiveDate>> {
        self.engine.partitions().await
    }

    pub async fn rows_in_partition(
        &self,
        partition: NaiveDate,
        include_deleted: bool,
    ) -> Result<Vec<WarehouseRow>> {
        self.engine.rows_in_partition(partition, include_deleted).await
    }

    pub async fn soft_delete(
        &self,
        source_document_id: impl Into<String>,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.engine
            .soft_delete(source_document_id.into().as_str(), deleted_at)
            .await
    }

    pub async fn purge_soft_deleted(
        &self,
        partition: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        self.engine.purge_soft_deleted(partition, cutoff).await
    }

    pub async fn purge_partition(&self, partition: NaiveDate) -> Result<u64> {
        self.engine.purge_partition(partition).await
    }

    pub async fn replace_aggregates(
        &self,
        period_key: impl Into<String>,
        rows: Vec<AggregateRow>,
    ) -> Result<()> {
        self.engine
            .replace_aggregates(period_key.into().as_str(), rows)
            .await
    }

    pub async fn aggregates(&self, period_key: impl Into<String>) -> Result<Vec<AggregateRow>> {
        self.engine.aggregates(period_key.into().as_str()).await
    }
}

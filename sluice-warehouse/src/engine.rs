use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dyn_clone::DynClone;

use crate::{
    error::Result,
    row::{AggregateRow, WarehouseRow},
};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

/// Storage engine for warehouse rows and aggregate tables.
///
/// `upsert` is keyed by `event_id`: redelivering the same event converges to
/// one row. On conflict the write with the later `occurred_at` wins for
/// `fields`; `is_deleted`/`deleted_at` are owned by the lifecycle sweep and
/// survive the merge.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    async fn upsert(&self, rows: Vec<WarehouseRow>) -> Result<()>;

    async fn get(&self, event_id: &'_ str) -> Result<Option<WarehouseRow>>;

    /// Distinct partition dates, ascending.
    async fn partitions(&self) -> Result<Vec<NaiveDate>>;

    async fn rows_in_partition(
        &self,
        partition: NaiveDate,
        include_deleted: bool,
    ) -> Result<Vec<WarehouseRow>>;

    /// Flag every row of the document as deleted. Idempotent; already-deleted
    /// rows keep their original `deleted_at`.
    async fn soft_delete(
        &self,
        source_document_id: &'_ str,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Physically remove soft-deleted rows of one partition whose
    /// `deleted_at` is before `cutoff`. Atomic per partition.
    async fn purge_soft_deleted(&self, partition: NaiveDate, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Hard-retention expiry: remove one whole partition. Atomic.
    async fn purge_partition(&self, partition: NaiveDate) -> Result<u64>;

    /// Replace every aggregate row of the period. Delete-then-insert, so a
    /// rerun of the same period is self-correcting.
    async fn replace_aggregates(&self, period_key: &'_ str, rows: Vec<AggregateRow>) -> Result<()>;

    async fn aggregates(&self, period_key: &'_ str) -> Result<Vec<AggregateRow>>;
}

dyn_clone::clone_trait_object!(Engine);

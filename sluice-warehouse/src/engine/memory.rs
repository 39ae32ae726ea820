use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    engine::Engine,
    error::Result,
    row::{AggregateRow, WarehouseRow},
    warehouse::Warehouse,
};

#[derive(Debug, Default)]
struct State {
    rows: HashMap<String, WarehouseRow>,
    aggregates: HashMap<String, Vec<AggregateRow>>,
}

#[derive(Debug, Clone, Default)]
pub struct Memory(Arc<RwLock<State>>);

impl Memory {
    pub fn warehouse() -> Warehouse {
        Warehouse::new(Self::default())
    }
}

#[async_trait]
impl Engine for Memory {
    async fn upsert(&self, rows: Vec<WarehouseRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut state = self.0.write();

        for row in rows {
            match state.rows.get_mut(&row.event_id) {
                Some(existing) => {
                    if row.occurred_at < existing.occurred_at {
                        continue;
                    }

                    existing.subject_hash = row.subject_hash;
                    existing.source_collection = row.source_collection;
                    existing.source_document_id = row.source_document_id;
                    existing.fields = row.fields;
                    existing.partition_date = row.partition_date;
                    existing.occurred_at = row.occurred_at;
                    existing.written_at = row.written_at;
                }
                _ => {
                    state.rows.insert(row.event_id.to_owned(), row);
                }
            }
        }

        Ok(())
    }

    async fn get(&self, event_id: &'_ str) -> Result<Option<WarehouseRow>> {
        Ok(self.0.read().rows.get(event_id).cloned())
    }

    async fn partitions(&self) -> Result<Vec<NaiveDate>> {
        let dates = self
            .0
            .read()
            .rows
            .values()
            .map(|row| row.partition_date)
            .collect::<BTreeSet<_>>();

        Ok(dates.into_iter().collect())
    }

    async fn rows_in_partition(
        &self,
        partition: NaiveDate,
        include_deleted: bool,
    ) -> Result<Vec<WarehouseRow>> {
        let mut rows = self
            .0
            .read()
            .rows
            .values()
            .filter(|row| row.partition_date == partition)
            .filter(|row| include_deleted || !row.is_deleted)
            .cloned()
            .collect::<Vec<_>>();

        rows.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        Ok(rows)
    }

    async fn soft_delete(
        &self,
        source_document_id: &'_ str,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.0.write();
        let mut flagged = 0;

        for row in state.rows.values_mut() {
            if row.source_document_id != source_document_id || row.is_deleted {
                continue;
            }

            row.is_deleted = true;
            row.deleted_at = Some(deleted_at);
            flagged += 1;
        }

        Ok(flagged)
    }

    async fn purge_soft_deleted(&self, partition: NaiveDate, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.0.write();
        let before = state.rows.len();

        state.rows.retain(|_, row| {
            row.partition_date != partition
                || !row.is_deleted
                || row.deleted_at.map(|at| at >= cutoff).unwrap_or(true)
        });

        Ok((before - state.rows.len()) as u64)
    }

    async fn purge_partition(&self, partition: NaiveDate) -> Result<u64> {
        let mut state = self.0.write();
        let before = state.rows.len();

        state.rows.retain(|_, row| row.partition_date != partition);

        Ok((before - state.rows.len()) as u64)
    }

    async fn replace_aggregates(&self, period_key: &'_ str, rows: Vec<AggregateRow>) -> Result<()> {
        self.0
            .write()
            .aggregates
            .insert(period_key.to_owned(), rows);

        Ok(())
    }

    async fn aggregates(&self, period_key: &'_ str) -> Result<Vec<AggregateRow>> {
        Ok(self
            .0
            .read()
            .aggregates
            .get(period_key)
            .cloned()
            .unwrap_or_default())
    }
}

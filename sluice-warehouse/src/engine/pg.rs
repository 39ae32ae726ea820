use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    engine::Engine,
    error::Result,
    row::{AggregateRow, WarehouseRow},
    warehouse::Warehouse,
};

/// Apply the warehouse schema. Migrations are additive-only; destructive
/// column changes require a new migration file.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
    prefix: Option<String>,
}

impl PgWarehouse {
    pub fn new(pool: &PgPool) -> Warehouse {
        Warehouse::new(Self {
            pool: pool.clone(),
            prefix: None,
        })
    }

    pub fn with_prefix(pool: &PgPool, prefix: impl Into<String>) -> Warehouse {
        Warehouse::new(Self {
            pool: pool.clone(),
            prefix: Some(prefix.into()),
        })
    }

    pub fn table(&self, name: impl Into<String>) -> String {
        format!(
            "{}_{}",
            self.prefix.as_ref().unwrap_or(&"sl".to_owned()),
            name.into()
        )
    }

    pub fn table_rows(&self) -> String {
        self.table("warehouse_row")
    }

    pub fn table_aggregates(&self) -> String {
        self.table("aggregate_row")
    }
}

#[async_trait]
impl Engine for PgWarehouse {
    async fn upsert(&self, rows: Vec<WarehouseRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let table_rows = self.table_rows();
        let mut tx = self.pool.begin().await?;

        for rows in rows.chunks(100).collect::<Vec<&[WarehouseRow]>>() {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {table_rows} (event_id, subject_hash, source_collection, source_document_id, fields, partition_date, occurred_at, is_deleted, deleted_at, written_at) "
            ));

            query_builder.push_values(rows, |mut b, row| {
                b.push_bind(row.event_id.to_owned())
                    .push_bind(row.subject_hash.to_owned())
                    .push_bind(row.source_collection.to_owned())
                    .push_bind(row.source_document_id.to_owned())
                    .push_bind(row.fields.clone())
                    .push_bind(row.partition_date)
                    .push_bind(row.occurred_at)
                    .push_bind(row.is_deleted)
                    .push_bind(row.deleted_at)
                    .push_bind(row.written_at);
            });

            // deletion flags are lifecycle-owned and survive the merge
            query_builder.push(format!(
                r#"
                ON CONFLICT (event_id) DO UPDATE SET
                    subject_hash = excluded.subject_hash,
                    source_collection = excluded.source_collection,
                    source_document_id = excluded.source_document_id,
                    fields = excluded.fields,
                    partition_date = excluded.partition_date,
                    occurred_at = excluded.occurred_at,
                    written_at = excluded.written_at
                WHERE excluded.occurred_at >= {table_rows}.occurred_at
                "#
            ));

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, event_id: &'_ str) -> Result<Option<WarehouseRow>> {
        let table_rows = self.table_rows();
        let row = sqlx::query_as::<_, WarehouseRow>(
            format!("SELECT * FROM {table_rows} WHERE event_id = $1").as_str(),
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn partitions(&self) -> Result<Vec<NaiveDate>> {
        let table_rows = self.table_rows();
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            format!("SELECT DISTINCT partition_date FROM {table_rows} ORDER BY partition_date ASC")
                .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }

    async fn rows_in_partition(
        &self,
        partition: NaiveDate,
        include_deleted: bool,
    ) -> Result<Vec<WarehouseRow>> {
        let table_rows = self.table_rows();
        let deleted_filter = if include_deleted {
            ""
        } else {
            "AND is_deleted = FALSE"
        };

        let rows = sqlx::query_as::<_, WarehouseRow>(
            format!(
                r#"
                SELECT * FROM {table_rows}
                WHERE partition_date = $1 {deleted_filter}
                ORDER BY occurred_at ASC, event_id ASC
                "#
            )
            .as_str(),
        )
        .bind(partition)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn soft_delete(
        &self,
        source_document_id: &'_ str,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64> {
        let table_rows = self.table_rows();
        let result = sqlx::query(
            format!(
                r#"
                UPDATE {table_rows}
                SET is_deleted = TRUE, deleted_at = $2
                WHERE source_document_id = $1 AND is_deleted = FALSE
                "#
            )
            .as_str(),
        )
        .bind(source_document_id)
        .bind(deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_soft_deleted(&self, partition: NaiveDate, cutoff: DateTime<Utc>) -> Result<u64> {
        let table_rows = self.table_rows();
        let result = sqlx::query(
            format!(
                r#"
                DELETE FROM {table_rows}
                WHERE partition_date = $1 AND is_deleted = TRUE AND deleted_at < $2
                "#
            )
            .as_str(),
        )
        .bind(partition)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_partition(&self, partition: NaiveDate) -> Result<u64> {
        let table_rows = self.table_rows();
        let result = sqlx::query(
            format!("DELETE FROM {table_rows} WHERE partition_date = $1").as_str(),
        )
        .bind(partition)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn replace_aggregates(&self, period_key: &'_ str, rows: Vec<AggregateRow>) -> Result<()> {
        let table_aggregates = self.table_aggregates();
        let mut tx = self.pool.begin().await?;

        sqlx::query(format!("DELETE FROM {table_aggregates} WHERE period_key = $1").as_str())
            .bind(period_key)
            .execute(&mut *tx)
            .await?;

        for rows in rows.chunks(100).collect::<Vec<&[AggregateRow]>>() {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {table_aggregates} (period_key, dimension, metrics, generated_at) "
            ));

            query_builder.push_values(rows, |mut b, row| {
                b.push_bind(row.period_key.to_owned())
                    .push_bind(row.dimension.to_owned())
                    .push_bind(row.metrics.clone())
                    .push_bind(row.generated_at);
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn aggregates(&self, period_key: &'_ str) -> Result<Vec<AggregateRow>> {
        let table_aggregates = self.table_aggregates();
        let rows = sqlx::query_as::<_, AggregateRow>(
            format!(
                r#"
                SELECT * FROM {table_aggregates}
                WHERE period_key = $1
                ORDER BY dimension ASC
                "#
            )
            .as_str(),
        )
        .bind(period_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::{
    engine::Engine,
    envelope::{DeadLetter, Delivery, Envelope},
    error::Result,
    queue::Queue,
};

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
    prefix: Option<String>,
}

impl PgQueue {
    pub fn new(pool: &PgPool) -> Queue {
        Queue::new(Self {
            pool: pool.clone(),
            prefix: None,
        })
    }

    pub fn with_prefix(pool: &PgPool, prefix: impl Into<String>) -> Queue {
        Queue::new(Self {
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

    pub fn table_queue(&self) -> String {
        self.table("queue")
    }

    pub fn table_deadletters(&self) -> String {
        self.table("deadletter")
    }
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    envelope: Value,
    failure_reason: String,
    retry_count: i32,
    failed_at: DateTime<Utc>,
}

impl DeadLetterRow {
    fn into_dead_letter(self) -> Result<DeadLetter> {
        Ok(DeadLetter {
            envelope: serde_json::from_value(self.envelope)?,
            failure_reason: self.failure_reason,
            failed_at: self.failed_at,
            retry_count: self.retry_count as u16,
        })
    }
}

#[async_trait]
impl Engine for PgQueue {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let table_queue = self.table_queue();

        sqlx::query(
            format!(
                r#"
                INSERT INTO {table_queue} (event_id, envelope, redelivery_count, in_flight, enqueued_at)
                VALUES ($1, $2, 0, FALSE, $3)
                ON CONFLICT (event_id) DO NOTHING
                "#
            )
            .as_str(),
        )
        .bind(envelope.event_id.to_owned())
        .bind(serde_json::to_value(&envelope)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn receive(&self, max: u16) -> Result<Vec<Delivery>> {
        let table_queue = self.table_queue();

        let rows = sqlx::query_as::<_, (Value, i32)>(
            format!(
                r#"
                UPDATE {table_queue}
                SET in_flight = TRUE, redelivery_count = redelivery_count + 1
                WHERE event_id IN (
                    SELECT event_id FROM {table_queue}
                    WHERE in_flight = FALSE
                    ORDER BY enqueued_at ASC
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING envelope, redelivery_count
                "#
            )
            .as_str(),
        )
        .bind(i64::from(max))
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries = Vec::with_capacity(rows.len());

        for (envelope, redelivery_count) in rows {
            deliveries.push(Delivery {
                envelope: serde_json::from_value(envelope)?,
                redelivery_count: redelivery_count as u16,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, event_id: &'_ str) -> Result<()> {
        let table_queue = self.table_queue();

        sqlx::query(format!("DELETE FROM {table_queue} WHERE event_id = $1").as_str())
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn nack(&self, event_id: &'_ str) -> Result<()> {
        let table_queue = self.table_queue();

        sqlx::query(
            format!("UPDATE {table_queue} SET in_flight = FALSE WHERE event_id = $1").as_str(),
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
        let table_deadletters = self.table_deadletters();

        sqlx::query(
            format!(
                r#"
                INSERT INTO {table_deadletters} (event_id, envelope, failure_reason, retry_count, failed_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (event_id) DO NOTHING
                "#
            )
            .as_str(),
        )
        .bind(letter.envelope.event_id.to_owned())
        .bind(serde_json::to_value(&letter.envelope)?)
        .bind(letter.failure_reason.to_owned())
        .bind(i32::from(letter.retry_count))
        .bind(letter.failed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>> {
        let table_deadletters = self.table_deadletters();

        let row = sqlx::query_as::<_, DeadLetterRow>(
            format!(
                r#"
                SELECT envelope, failure_reason, retry_count, failed_at
                FROM {table_deadletters}
                WHERE event_id = $1
                "#
            )
            .as_str(),
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeadLetterRow::into_dead_letter).transpose()
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let table_deadletters = self.table_deadletters();

        let rows = sqlx::query_as::<_, DeadLetterRow>(
            format!(
                r#"
                SELECT envelope, failure_reason, retry_count, failed_at
                FROM {table_deadletters}
                ORDER BY failed_at ASC
                "#
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(DeadLetterRow::into_dead_letter)
            .collect()
    }

    async fn remove_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>> {
        let table_deadletters = self.table_deadletters();

        let row = sqlx::query_as::<_, DeadLetterRow>(
            format!(
                r#"
                DELETE FROM {table_deadletters}
                WHERE event_id = $1
                RETURNING envelope, failure_reason, retry_count, failed_at
                "#
            )
            .as_str(),
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeadLetterRow::into_dead_letter).transpose()
    }
}

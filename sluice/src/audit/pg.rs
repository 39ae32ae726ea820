use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, AuditRecorder, AuditStatus, Engine},
    error::Result,
};

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgAudit {
    pool: PgPool,
    prefix: Option<String>,
}

impl PgAudit {
    pub fn new(pool: &PgPool) -> AuditRecorder {
        AuditRecorder::new(Self {
            pool: pool.clone(),
            prefix: None,
        })
    }

    pub fn with_prefix(pool: &PgPool, prefix: impl Into<String>) -> AuditRecorder {
        AuditRecorder::new(Self {
            pool: pool.clone(),
            prefix: Some(prefix.into()),
        })
    }

    pub fn table_entries(&self) -> String {
        format!(
            "{}_audit_entry",
            self.prefix.as_ref().unwrap_or(&"sl".to_owned())
        )
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    event_id: String,
    status: String,
    retry_count: i32,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<AuditEntry> {
        let status = match self.status.as_str() {
            "success" => AuditStatus::Success,
            "retrying" => AuditStatus::Retrying,
            "failed" => AuditStatus::Failed,
            "recovered" => AuditStatus::Recovered,
            "discarded" => AuditStatus::Discarded,
            "purged" => AuditStatus::Purged,
            other => return Err(anyhow!("unknown audit status `{other}`").into()),
        };

        Ok(AuditEntry {
            id: self.id,
            event_id: self.event_id,
            status,
            retry_count: self.retry_count as u16,
            error_message: self.error_message,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
impl Engine for PgAudit {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let table_entries = self.table_entries();

        sqlx::query(
            format!(
                r#"
                INSERT INTO {table_entries} (id, event_id, status, retry_count, error_message, started_at, completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#
            )
            .as_str(),
        )
        .bind(entry.id)
        .bind(entry.event_id.to_owned())
        .bind(entry.status.as_str())
        .bind(i32::from(entry.retry_count))
        .bind(entry.error_message.clone())
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn by_event_id(&self, event_id: &'_ str) -> Result<Vec<AuditEntry>> {
        let table_entries = self.table_entries();

        let rows = sqlx::query_as::<_, EntryRow>(
            format!(
                r#"
                SELECT * FROM {table_entries}
                WHERE event_id = $1
                ORDER BY completed_at ASC
                "#
            )
            .as_str(),
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    async fn all(&self) -> Result<Vec<AuditEntry>> {
        let table_entries = self.table_entries();

        let rows = sqlx::query_as::<_, EntryRow>(
            format!("SELECT * FROM {table_entries} ORDER BY completed_at ASC").as_str(),
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}

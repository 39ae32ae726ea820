use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One pseudonymized record in the warehouse, keyed by the `event_id` of the
/// envelope it was built from. The raw subject identifier is never stored;
/// `subject_hash` is the only handle for correlating a subject's rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "pg", derive(sqlx::FromRow))]
pub struct WarehouseRow {
    pub event_id: String,
    pub subject_hash: String,
    pub source_collection: String,
    pub source_document_id: String,
    pub fields: Value,
    pub partition_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub written_at: DateTime<Utc>,
}

impl WarehouseRow {
    pub fn to_fields<D: DeserializeOwned>(&self) -> Result<D> {
        Ok(serde_json::from_value(self.fields.clone())?)
    }

    pub fn fields<F: Serialize>(mut self, value: F) -> Result<Self> {
        self.fields = serde_json::to_value(&value)?;

        Ok(self)
    }
}

impl Default for WarehouseRow {
    fn default() -> Self {
        let now = Utc::now();

        Self {
            event_id: String::default(),
            subject_hash: String::default(),
            source_collection: String::default(),
            source_document_id: String::default(),
            fields: Value::default(),
            partition_date: now.date_naive(),
            occurred_at: now,
            is_deleted: false,
            deleted_at: None,
            written_at: now,
        }
    }
}

/// One rollup row, regenerated wholesale per period. `metrics` is an open
/// JSON object so new metrics stay additive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "pg", derive(sqlx::FromRow))]
pub struct AggregateRow {
    pub period_key: String,
    pub dimension: String,
    pub metrics: Value,
    pub generated_at: DateTime<Utc>,
}

impl AggregateRow {
    pub fn to_metrics<D: DeserializeOwned>(&self) -> Result<D> {
        Ok(serde_json::from_value(self.metrics.clone())?)
    }
}

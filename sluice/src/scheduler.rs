use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use sluice_warehouse::{AggregateRow, Warehouse};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};
use tracing::{error, info};

use crate::{
    alert::{Alert, AlertSink},
    error::Result,
};

/// A completed aggregation period. Weekly periods are ISO weeks starting on
/// Monday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Daily(NaiveDate),
    Weekly(NaiveDate),
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

impl Period {
    /// The most recent fully elapsed day before `now`.
    pub fn daily_before(now: DateTime<Utc>) -> Self {
        Period::Daily(now.date_naive() - Duration::days(1))
    }

    /// The most recent fully elapsed ISO week before `now`.
    pub fn weekly_before(now: DateTime<Utc>) -> Self {
        Period::Weekly(week_start(now.date_naive()) - Duration::days(7))
    }

    pub fn key(&self) -> String {
        match self {
            Period::Daily(date) => date.format("%Y-%m-%d").to_string(),
            Period::Weekly(date) => {
                let week = week_start(*date).iso_week();

                format!("{}-W{:02}", week.year(), week.week())
            }
        }
    }

    /// The partitions covered by this period, ascending.
    pub fn partitions(&self) -> Vec<NaiveDate> {
        match self {
            Period::Daily(date) => vec![*date],
            Period::Weekly(date) => {
                let start = week_start(*date);

                (0..7).map(|i| start + Duration::days(i)).collect()
            }
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    rows: u64,
    sums: BTreeMap<String, f64>,
}

/// Recomputes rollup tables from raw warehouse rows, one period per run.
///
/// Writes use replace-for-period semantics, so a rerun of the same period is
/// idempotent and self-correcting; a failed run leaves the previous
/// aggregates untouched.
#[derive(Clone)]
pub struct AggregationScheduler {
    warehouse: Warehouse,
    alerts: Box<dyn AlertSink>,
    alert_after_failures: u32,
    running: Arc<AtomicBool>,
    consecutive_failures: Arc<AtomicU32>,
}

impl AggregationScheduler {
    pub fn new(warehouse: Warehouse, alerts: Box<dyn AlertSink>, alert_after_failures: u32) -> Self {
        Self {
            warehouse,
            alerts,
            alert_after_failures,
            running: Arc::new(AtomicBool::new(false)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Compute and replace every rollup of the period. Soft-deleted rows are
    /// excluded from all metrics.
    pub async fn run(&self, period: &Period) -> Result<()> {
        let period_key = period.key();
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

        for partition in period.partitions() {
            for row in self.warehouse.rows_in_partition(partition, false).await? {
                let bucket = buckets.entry(row.source_collection.to_owned()).or_default();
                bucket.rows += 1;

                let Value::Object(fields) = &row.fields else {
                    continue;
                };

                for (field, value) in fields {
                    if let Some(number) = value.as_f64() {
                        *bucket.sums.entry(field.to_owned()).or_insert(0.0) += number;
                    }
                }
            }
        }

        let generated_at = Utc::now();
        let rows = buckets
            .into_iter()
            .map(|(dimension, bucket)| AggregateRow {
                period_key: period_key.to_owned(),
                dimension,
                metrics: json!({ "rows": bucket.rows, "sum": bucket.sums }),
                generated_at,
            })
            .collect::<Vec<_>>();

        info!("aggregated {} rollups for period {period_key}", rows.len());

        self.warehouse.replace_aggregates(&period_key, rows).await?;

        Ok(())
    }

    /// Scheduled entry point: skips the trigger when the previous run is
    /// still live and alerts on persistent failure without ever blocking the
    /// ingestion path.
    pub async fn run_scheduled(&self, period: &Period) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("previous run still live, skipped period {}", period.key());

            return Ok(());
        }

        let result = self.run(period).await;
        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);

                Ok(())
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

                error!("aggregation of period {} failed {failures} times: {e}", period.key());

                if failures >= self.alert_after_failures {
                    self.alerts
                        .alert(Alert::scheduler(period.key(), e.to_string()));
                }

                Err(e)
            }
        }
    }
}

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sluice_warehouse::Warehouse;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info};

use crate::{
    alert::{Alert, AlertSink},
    audit::{AuditEntry, AuditRecorder},
    config::PipelineConfig,
    error::Result,
};

/// Cooperative cancellation for a running sweep. Checked between partitions;
/// each partition's purge is a single atomic engine call, so cancelling never
/// leaves a partition half-purged.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub purged_rows: u64,
    pub expired_partitions: u64,
    pub failed_partitions: Vec<NaiveDate>,
    pub cancelled: bool,
}

/// Enforces retention over the warehouse.
///
/// Row state machine: active → soft-deleted (grace window) → purged. Soft
/// deletion happens on the ingestion path when a `delete` envelope flows
/// through the worker; the sweep owns both purge transitions. Partitions past
/// the hard retention age expire wholesale regardless of deletion state.
#[derive(Clone)]
pub struct LifecycleManager {
    warehouse: Warehouse,
    audit: AuditRecorder,
    alerts: Box<dyn AlertSink>,
    config: PipelineConfig,
    cancel: CancelToken,
    running: Arc<AtomicBool>,
}

impl LifecycleManager {
    pub fn new(
        warehouse: Warehouse,
        audit: AuditRecorder,
        alerts: Box<dyn AlertSink>,
        config: PipelineConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            warehouse,
            audit,
            alerts,
            config,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Walk every partition once, oldest first. One partition's failure is
    /// logged and alerted but never blocks the rest of the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let hard_cutoff = now.date_naive() - Duration::days(self.config.hard_retention_days);
        let grace_cutoff = now - Duration::days(self.config.grace_window_days);
        let mut report = SweepReport::default();

        for partition in self.warehouse.partitions().await? {
            if self.cancel.is_cancelled() {
                info!(%partition, "sweep cancelled");
                report.cancelled = true;

                break;
            }

            let expired = partition < hard_cutoff;
            let purged = if expired {
                self.warehouse.purge_partition(partition).await
            } else {
                self.warehouse.purge_soft_deleted(partition, grace_cutoff).await
            };

            match purged {
                Ok(0) => {}
                Ok(rows) => {
                    info!(%partition, rows, expired, "purged");

                    report.purged_rows += rows;

                    if expired {
                        report.expired_partitions += 1;
                    }

                    self.audit.append(AuditEntry::purged(partition, rows)).await?;
                }
                Err(e) => {
                    error!(%partition, "sweep failed: {e}");

                    self.alerts.alert(Alert::lifecycle(partition, e.to_string()));
                    report.failed_partitions.push(partition);
                }
            }
        }

        Ok(report)
    }

    /// Scheduled entry point with the same non-overlap guard as the
    /// aggregation scheduler.
    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> Result<Option<SweepReport>> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("previous sweep still live, skipped");

            return Ok(None);
        }

        let result = self.sweep(now).await;
        self.running.store(false, Ordering::SeqCst);

        result.map(Some)
    }
}

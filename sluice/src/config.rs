//! Configuration defaults for the pipeline.
//!
//! Every value here was previously an implicit constant of the source system;
//! they are named so operators can tune them per deployment.

use std::time::Duration;

/// Total processing attempts per message before it is dead-lettered.
pub const MAX_ATTEMPTS: u16 = 3;

/// First retry backoff; each further retry doubles it.
pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Days a soft-deleted row stays recoverable before the sweep purges it.
pub const GRACE_WINDOW_DAYS: i64 = 30;

/// Hard retention age in days; partitions older than this expire wholesale,
/// regardless of deletion state.
pub const HARD_RETENTION_DAYS: i64 = 730;

/// Upper bound on deliveries pulled per worker poll. This is also the bound
/// on messages processed concurrently by one worker.
pub const RECEIVE_BATCH_SIZE: u16 = 100;

/// Worker poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive scheduled-run failures before an alert fires.
pub const ALERT_AFTER_FAILURES: u32 = 3;

/// Payload key holding the raw subject identifier. The worker hashes it and
/// strips it from the stored fields; when absent, the source document id is
/// the subject.
pub const SUBJECT_FIELD: &str = "subject_id";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: u16,
    pub retry_initial_backoff: Duration,
    pub grace_window_days: i64,
    pub hard_retention_days: i64,
    pub receive_batch_size: u16,
    pub poll_interval: Duration,
    pub alert_after_failures: u32,
    pub subject_field: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_initial_backoff: RETRY_INITIAL_BACKOFF,
            grace_window_days: GRACE_WINDOW_DAYS,
            hard_retention_days: HARD_RETENTION_DAYS,
            receive_batch_size: RECEIVE_BATCH_SIZE,
            poll_interval: POLL_INTERVAL,
            alert_after_failures: ALERT_AFTER_FAILURES,
            subject_field: SUBJECT_FIELD.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: PipelineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, value: u16) -> Self {
        self.config.max_attempts = value;
        self
    }

    pub fn retry_initial_backoff(mut self, value: Duration) -> Self {
        self.config.retry_initial_backoff = value;
        self
    }

    pub fn grace_window_days(mut self, value: i64) -> Self {
        self.config.grace_window_days = value;
        self
    }

    pub fn hard_retention_days(mut self, value: i64) -> Self {
        self.config.hard_retention_days = value;
        self
    }

    pub fn receive_batch_size(mut self, value: u16) -> Self {
        self.config.receive_batch_size = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    pub fn alert_after_failures(mut self, value: u32) -> Self {
        self.config.alert_after_failures = value;
        self
    }

    pub fn subject_field(mut self, value: impl Into<String>) -> Self {
        self.config.subject_field = value.into();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

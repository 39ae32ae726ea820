use chrono::NaiveDate;
use dyn_clone::DynClone;
use serde::Serialize;
use tracing::error;

/// Operational alert payload, fired on dead-letter routing and on persistent
/// scheduler/sweep failure. Serializable so a webhook sink can post it as-is.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub component: String,
    pub summary: String,
    pub event_id: Option<String>,
    pub partition: Option<NaiveDate>,
}

impl Alert {
    pub fn worker(event_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            component: "worker".to_owned(),
            summary: summary.into(),
            event_id: Some(event_id.into()),
            partition: None,
        }
    }

    pub fn scheduler(period_key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            component: "scheduler".to_owned(),
            summary: format!("{} (period {})", summary.into(), period_key.into()),
            event_id: None,
            partition: None,
        }
    }

    pub fn lifecycle(partition: NaiveDate, summary: impl Into<String>) -> Self {
        Self {
            component: "lifecycle".to_owned(),
            summary: summary.into(),
            event_id: None,
            partition: Some(partition),
        }
    }
}

/// Outbound alert channel. Fire-and-forget: a sink must never fail the
/// pipeline decision that triggered it.
pub trait AlertSink: DynClone + Send + Sync {
    fn alert(&self, alert: Alert);
}

dyn_clone::clone_trait_object!(AlertSink);

/// Default sink: structured error logs, picked up by log-based alerting.
#[derive(Debug, Clone, Default)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn alert(&self, alert: Alert) {
        error!(
            "[{}] {} (event_id={}, partition={})",
            alert.component,
            alert.summary,
            alert.event_id.as_deref().unwrap_or("-"),
            alert.partition.map(|p| p.to_string()).unwrap_or_else(|| "-".to_owned())
        );
    }
}

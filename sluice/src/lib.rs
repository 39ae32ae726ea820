#![forbid(unsafe_code)]

pub mod audit;
pub mod config;

mod alert;
mod emitter;
mod error;
mod lifecycle;
mod pseudonym;
mod recovery;
mod scheduler;
mod worker;

pub use alert::{Alert, AlertSink, TracingAlerts};
pub use audit::{AuditEntry, AuditRecorder, AuditStatus};
pub use config::{ConfigBuilder, PipelineConfig};
pub use emitter::{ChangeCapture, ChangeNotification};
pub use error::{PipelineError, Result};
pub use lifecycle::{CancelToken, LifecycleManager, SweepReport};
pub use pseudonym::{Pseudonymizer, SubjectSalt};
pub use recovery::{Credentials, Recovered, RecoveryService, Role};
pub use scheduler::{AggregationScheduler, Period};
pub use worker::TransformWorker;

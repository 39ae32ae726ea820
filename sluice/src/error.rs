use sluice_mq::MqError;
use sluice_warehouse::WarehouseError;

/// Pipeline error taxonomy. The worker retries `Transient` failures against
/// its budget; everything else is terminal for the message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("authorization: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[cfg(feature = "pg")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Transient(_) | PipelineError::Any(_) => true,
            #[cfg(feature = "pg")]
            PipelineError::Sqlx(_) => true,
            _ => false,
        }
    }
}

impl From<MqError> for PipelineError {
    fn from(e: MqError) -> Self {
        match e {
            MqError::Validation(e) => PipelineError::Validation(e.to_string()),
            e => PipelineError::Transient(e.to_string()),
        }
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(e: WarehouseError) -> Self {
        PipelineError::Transient(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

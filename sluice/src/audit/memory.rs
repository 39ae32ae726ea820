use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::{
    audit::{AuditEntry, AuditRecorder, Engine},
    error::Result,
};

#[derive(Debug, Clone, Default)]
pub struct Memory(Arc<RwLock<Vec<AuditEntry>>>);

impl Memory {
    pub fn recorder() -> AuditRecorder {
        AuditRecorder::new(Self::default())
    }
}

#[async_trait]
impl Engine for Memory {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.0.write().push(entry);

        Ok(())
    }

    async fn by_event_id(&self, event_id: &'_ str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .0
            .read()
            .iter()
            .filter(|entry| entry.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.0.read().clone())
    }
}

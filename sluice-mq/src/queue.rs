use validator::Validate;

use crate::{
    engine::Engine,
    envelope::{DeadLetter, Delivery, Envelope},
    error::Result,
};

/// Client handle over a queue [`Engine`]. Publishing validates the envelope
/// shape first; a malformed envelope never reaches the topic.
#[derive(Clone)]
pub struct Queue {
    engine: Box<dyn Engine>,
}

impl Queue {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub async fn publish(&self, envelope: Envelope) -> Result<()> {
        envelope.validate()?;

        self.engine.publish(envelope).await
    }

    pub async fn receive(&self, max: u16) -> Result<Vec<Delivery>> {
        self.engine.receive(max).await
    }

    pub async fn ack(&self, event_id: impl Into<String>) -> Result<()> {
        self.engine.ack(event_id.into().as_str()).await
    }

    pub async fn nack(&self, event_id: impl Into<String>) -> Result<()> {
        self.engine.nack(event_id.into().as_str()).await
    }

    pub async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
        self.engine.dead_letter(letter).await
    }

    pub async fn find_dead_letter(
        &self,
        event_id: impl Into<String>,
    ) -> Result<Option<DeadLetter>> {
        self.engine.find_dead_letter(event_id.into().as_str()).await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.engine.dead_letters().await
    }

    /// Destroy a dead letter after successful recovery.
    pub async fn remove_dead_letter(
        &self,
        event_id: impl Into<String>,
    ) -> Result<Option<DeadLetter>> {
        self.engine.remove_dead_letter(event_id.into().as_str()).await
    }

    /// Operator discard: same destruction, different intent.
    pub async fn discard_dead_letter(
        &self,
        event_id: impl Into<String>,
    ) -> Result<Option<DeadLetter>> {
        self.engine.remove_dead_letter(event_id.into().as_str()).await
    }
}

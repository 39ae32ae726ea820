use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::{
    envelope::{DeadLetter, Delivery, Envelope},
    error::Result,
};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

/// Durable at-least-once topic plus its companion dead-letter topic.
///
/// A received message stays in flight until it is settled: `ack` destroys it,
/// `nack` requeues it. An unsettled message is redelivered on a later
/// `receive` with its redelivery count incremented.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<()>;

    async fn receive(&self, max: u16) -> Result<Vec<Delivery>>;

    async fn ack(&self, event_id: &'_ str) -> Result<()>;

    async fn nack(&self, event_id: &'_ str) -> Result<()>;

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()>;

    async fn find_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;

    /// Remove and return the dead letter, if present.
    async fn remove_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>>;
}

dyn_clone::clone_trait_object!(Engine);

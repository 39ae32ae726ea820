use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use crate::{
    engine::Engine,
    envelope::{DeadLetter, Delivery, Envelope},
    error::Result,
    queue::Queue,
};

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<Envelope>,
    in_flight: HashMap<String, Envelope>,
    redeliveries: HashMap<String, u16>,
    dead: Vec<DeadLetter>,
}

#[derive(Debug, Clone, Default)]
pub struct Memory(Arc<RwLock<State>>);

impl Memory {
    pub fn queue() -> Queue {
        Queue::new(Self::default())
    }
}

#[async_trait]
impl Engine for Memory {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        self.0.write().pending.push_back(envelope);

        Ok(())
    }

    async fn receive(&self, max: u16) -> Result<Vec<Delivery>> {
        let mut state = self.0.write();
        let mut deliveries = Vec::new();

        while deliveries.len() < usize::from(max) {
            let Some(envelope) = state.pending.pop_front() else {
                break;
            };

            let redelivery_count = {
                let count = state
                    .redeliveries
                    .entry(envelope.event_id.to_owned())
                    .or_insert(0);
                *count += 1;

                *count
            };

            state
                .in_flight
                .insert(envelope.event_id.to_owned(), envelope.clone());

            deliveries.push(Delivery {
                envelope,
                redelivery_count,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, event_id: &'_ str) -> Result<()> {
        let mut state = self.0.write();
        state.in_flight.remove(event_id);
        state.redeliveries.remove(event_id);

        Ok(())
    }

    async fn nack(&self, event_id: &'_ str) -> Result<()> {
        let mut state = self.0.write();

        if let Some(envelope) = state.in_flight.remove(event_id) {
            state.pending.push_back(envelope);
        }

        Ok(())
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
        let mut state = self.0.write();

        if state
            .dead
            .iter()
            .any(|d| d.envelope.event_id == letter.envelope.event_id)
        {
            return Ok(());
        }

        state.dead.push(letter);

        Ok(())
    }

    async fn find_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>> {
        Ok(self
            .0
            .read()
            .dead
            .iter()
            .find(|d| d.envelope.event_id == event_id)
            .cloned())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.0.read().dead.clone())
    }

    async fn remove_dead_letter(&self, event_id: &'_ str) -> Result<Option<DeadLetter>> {
        let mut state = self.0.write();

        let Some(pos) = state
            .dead
            .iter()
            .position(|d| d.envelope.event_id == event_id)
        else {
            return Ok(None);
        };

        Ok(Some(state.dead.remove(pos)))
    }
}

//! # Progress Simulator
//!
//! Produce un segnale di progresso 0 → 100 a passi fissi, con un ritardo fisso
//! tra un valore e il successivo, indipendente dal lavoro reale di compressione.
//! Ogni run parte da una sequenza nuova; interrompere il consumo dello stream
//! basta per "cancellarlo".

use crate::config::Config;
use crate::state::ItemId;
use futures::stream::{self, Stream};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct ProgressSimulator {
    step: u8,
    tick: Duration,
}

impl ProgressSimulator {
    pub fn new(step: u8, tick: Duration) -> Self {
        Self {
            step: step.clamp(1, 100),
            tick,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.progress_step, config.progress_tick())
    }

    /// Sequenza lazy 0, step, 2·step, …, 100; il primo valore è immediato
    pub fn run(&self, id: ItemId) -> impl Stream<Item = u8> + Send + 'static {
        let step = self.step;
        let tick = self.tick;
        trace!("Starting simulated progress for {}", id);

        stream::unfold(Some(0u8), move |state| async move {
            let Some(value) = state else {
                return None;
            };
            if value > 0 {
                tokio::time::sleep(tick).await;
            }
            let next = if value >= 100 {
                None
            } else {
                Some(value.saturating_add(step).min(100))
            };
            Some((value, next))
        })
    }
}

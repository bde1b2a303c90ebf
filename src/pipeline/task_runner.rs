//! # Task Runner Module
//!
//! Esegue un singolo processing run di un item: Simulating → Compressing → Settled.
//! Separato dall'orchestratore per mantenere il drainer leggibile.
//!
//! Un item rimosso durante il run viene semplicemente abbandonato: il progresso
//! smette di essere inoltrato e un eventuale risultato viene rilasciato invece
//! di essere memorizzato.

use crate::{
    artifact::ArtifactLedger,
    error::CompressError,
    file_manager::FileManager,
    image_processor::CompressionService,
    json_output::SessionEvent,
    pipeline::progress_simulator::ProgressSimulator,
    profile::Profile,
    state::{ItemId, ItemStateStore, RunStart, RUNNING_PROGRESS_CAP},
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Esito di un run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Failed,
    /// Item rimosso durante il run
    Removed,
    /// Item assente o senza sorgente: nessun run avviato
    Skipped,
}

/// Worker per il run di un singolo item
pub struct TaskRunner {
    store: Arc<ItemStateStore>,
    compressor: Arc<dyn CompressionService>,
    simulator: ProgressSimulator,
    ledger: ArtifactLedger,
    events: broadcast::Sender<SessionEvent>,
    retain_sources: bool,
}

impl TaskRunner {
    pub fn new(
        store: Arc<ItemStateStore>,
        compressor: Arc<dyn CompressionService>,
        simulator: ProgressSimulator,
        ledger: ArtifactLedger,
        events: broadcast::Sender<SessionEvent>,
        retain_sources: bool,
    ) -> Self {
        Self {
            store,
            compressor,
            simulator,
            ledger,
            events,
            retain_sources,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // Nessun subscriber non è un errore
        let _ = self.events.send(event);
    }

    /// Processa un item contro `profile`
    pub async fn run(&self, id: ItemId, profile: Profile) -> RunOutcome {
        let Some(RunStart { name, source, run }) = self.store.begin_run(id).await else {
            debug!("Skipping {}: removed or no retained source", id);
            return RunOutcome::Skipped;
        };

        info!("[START] {} (run {}, profile {})", name, run, profile.label);
        self.publish(SessionEvent::ItemStarted {
            id,
            name: name.clone(),
            run,
            profile: profile.label.clone(),
        });

        // Simulating: il 100 è riservato all'esito `done`
        let mut ticks = std::pin::pin!(self.simulator.run(id));
        while let Some(progress) = ticks.next().await {
            if !self.store.set_progress(id, progress).await {
                debug!("{} removed during simulation, stopping", name);
                return RunOutcome::Removed;
            }
            self.publish(SessionEvent::ItemProgress {
                id,
                progress: progress.min(RUNNING_PROGRESS_CAP),
            });
        }

        // Compressing
        let original_size = source.len() as u64;
        let compressor = Arc::clone(&self.compressor);
        let result = tokio::task::spawn_blocking(move || compressor.compress(&source, &profile))
            .await
            .unwrap_or_else(|e| Err(CompressError::CompressionFailure(format!("compression task aborted: {}", e))));

        match result {
            Ok(output) => {
                let artifact = self.ledger.allocate(&name, output.bytes);
                let compressed_size = artifact.size();
                let file_name = artifact.info().file_name;

                if !self.store.complete(id, artifact, self.retain_sources).await {
                    debug!("{} removed during compression, result discarded", name);
                    return RunOutcome::Removed;
                }

                let reduction_percent = FileManager::calculate_reduction(original_size, compressed_size);
                info!(
                    "[OK] {}: {} -> {} ({:.1}% saved)",
                    name,
                    FileManager::format_size(original_size),
                    FileManager::format_size(compressed_size),
                    reduction_percent
                );
                self.publish(SessionEvent::ItemDone {
                    id,
                    name,
                    file_name,
                    original_size,
                    compressed_size,
                    reduction_percent,
                });
                RunOutcome::Done
            }
            Err(e) => {
                warn!("[ERROR] {}: {}", name, e);
                if !self.store.fail(id, e.to_string()).await {
                    return RunOutcome::Removed;
                }
                self.publish(SessionEvent::ItemFailed {
                    id,
                    name,
                    error: e.to_string(),
                });
                RunOutcome::Failed
            }
        }
    }
}

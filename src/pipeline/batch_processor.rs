//! # Batch Processor Main Orchestrator
//!
//! Orchestratore della sessione: accoda gli item, li processa uno alla volta e
//! gestisce rimozioni e cambi di profilo.
//!
//! ## Stati:
//! ```text
//! Idle ──submit/change_profile──► Draining ──coda vuota──► Idle
//!                                    │
//!              per item: Simulating → Compressing → Settled → pacing
//! ```
//!
//! ## Garanzie:
//! - Un solo drainer attivo: mai due item in Simulating/Compressing insieme
//! - L'item i+1 parte solo dopo che i è Settled ed è trascorso il pacing
//! - Un fallimento marca l'item `failed` e il drainer prosegue
//! - `remove` è soft: il run in corso non viene interrotto, il suo esito viene scartato

use crate::{
    artifact::ArtifactLedger,
    config::Config,
    error::CompressError,
    file_manager::{FileManager, SubmittedFile},
    image_processor::{CompressionService, JpegCompressor},
    json_output::{SessionEvent, EVENT_CHANNEL_CAPACITY},
    pipeline::{
        progress_simulator::ProgressSimulator,
        task_runner::{RunOutcome, TaskRunner},
    },
    profile::Profile,
    state::{ItemId, ItemStateStore, ItemStatus, ItemView},
};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

/// Esito dell'intake di un batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Id dei nuovi item, nell'ordine di sottomissione
    pub accepted: Vec<ItemId>,
    /// Numero di file scartati per tipo non supportato
    pub rejected: usize,
    pub rejected_names: Vec<String>,
}

/// Coda dei run in attesa più il flag del drainer, protetti dallo stesso lock
#[derive(Debug, Default)]
struct RunQueue {
    pending: VecDeque<ItemId>,
    draining: bool,
}

struct Shared {
    store: Arc<ItemStateStore>,
    runner: TaskRunner,
    ledger: ArtifactLedger,
    queue: Mutex<RunQueue>,
    profile_tx: watch::Sender<Profile>,
    idle_tx: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
    item_pacing: Duration,
}

/// Orchestratore principale della sessione
#[derive(Clone)]
pub struct BatchProcessor {
    shared: Arc<Shared>,
}

impl BatchProcessor {
    /// Crea un processor con il compressore JPEG integrato
    pub fn new(config: Config) -> Result<Self> {
        let compressor = Arc::new(JpegCompressor::from_config(&config));
        Self::with_compressor(config, compressor)
    }

    /// Crea un processor con un servizio di compressione esterno
    pub fn with_compressor(config: Config, compressor: Arc<dyn CompressionService>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(ItemStateStore::new());
        let ledger = ArtifactLedger::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (profile_tx, _) = watch::channel(config.profile.profile());
        let (idle_tx, _) = watch::channel(true);

        let runner = TaskRunner::new(
            Arc::clone(&store),
            compressor,
            ProgressSimulator::from_config(&config),
            ledger.clone(),
            events.clone(),
            config.retain_sources,
        );

        info!("Active profile: {}", config.profile.profile());
        debug!(
            "Pacing: progress step {} every {}ms, {}ms between items",
            config.progress_step, config.progress_tick_ms, config.item_pacing_ms
        );

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                runner,
                ledger,
                queue: Mutex::new(RunQueue::default()),
                profile_tx,
                idle_tx,
                events,
                item_pacing: config.item_pacing(),
            }),
        })
    }

    pub fn store(&self) -> Arc<ItemStateStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn ledger(&self) -> ArtifactLedger {
        self.shared.ledger.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn active_profile(&self) -> Profile {
        self.shared.profile_tx.borrow().clone()
    }

    pub fn is_idle(&self) -> bool {
        *self.shared.idle_tx.borrow()
    }

    /// Attende che la coda sia vuota e nessun run sia in corso
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.idle_tx.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.shared.events.send(event);
    }

    /// Filtra i file accettati, li aggiunge allo store in `pending` e rientra nella coda
    pub async fn submit(&self, files: Vec<SubmittedFile>) -> SubmitReport {
        let mut accepted = Vec::with_capacity(files.len());
        let mut rejected_names = Vec::new();
        for file in files {
            match FileManager::ensure_accepted(&file) {
                Ok(()) => accepted.push(file),
                Err(e) => {
                    debug!("{}", e);
                    rejected_names.push(file.name);
                }
            }
        }

        if !rejected_names.is_empty() {
            warn!(
                "Rejected {} file(s) with unsupported type: {}",
                rejected_names.len(),
                rejected_names.join(", ")
            );
            self.publish(SessionEvent::Rejected {
                count: rejected_names.len(),
                names: rejected_names.clone(),
            });
        }

        let ids = self.shared.store.append(accepted).await;
        if !ids.is_empty() {
            info!("Submitted {} file(s)", ids.len());
        }
        self.publish(SessionEvent::Submitted {
            accepted: ids.len(),
            rejected: rejected_names.len(),
            profile: self.active_profile().label,
        });

        self.enqueue(&ids).await;

        SubmitReport {
            accepted: ids,
            rejected: rejected_names.len(),
            rejected_names,
        }
    }

    /// Imposta il nuovo profilo e rimette in coda tutti gli item con sorgente conservata
    ///
    /// Returns the number of items scheduled for replay.
    pub async fn change_profile(&self, profile: impl Into<Profile>) -> usize {
        let profile = profile.into();
        info!("Switching profile to {}", profile);
        self.shared.profile_tx.send_replace(profile.clone());

        let candidates = self.shared.store.replay_candidates().await;
        let replayed = self.enqueue(&candidates).await;

        info!("Replaying {} item(s) under {}", replayed, profile.label);
        self.publish(SessionEvent::profile_changed(&profile, replayed));
        replayed
    }

    /// Rimuove un item in qualunque fase
    pub async fn remove(&self, id: ItemId) -> Result<ItemView, CompressError> {
        {
            let mut queue = self.shared.queue.lock().await;
            queue.pending.retain(|queued| *queued != id);
        }

        let removed = self
            .shared
            .store
            .remove(id)
            .await
            .ok_or(CompressError::UnknownItem(id))?;

        info!("Removed {} ({:?})", removed.name, removed.status);
        self.publish(SessionEvent::ItemRemoved {
            id,
            name: removed.name.clone(),
        });
        Ok(removed)
    }

    /// Accoda gli id non già in attesa e avvia il drainer se serve
    async fn enqueue(&self, ids: &[ItemId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let mut queue = self.shared.queue.lock().await;
        let mut added = 0;
        for id in ids {
            if !queue.pending.contains(id) {
                queue.pending.push_back(*id);
                added += 1;
            }
        }

        if !queue.draining && !queue.pending.is_empty() {
            queue.draining = true;
            self.shared.idle_tx.send_replace(false);
            let processor = self.clone();
            tokio::spawn(async move { processor.drain().await });
        }

        added
    }

    /// Drainer: processa la coda un item alla volta
    async fn drain(self) {
        debug!("Drainer started");
        loop {
            let next = {
                let mut queue = self.shared.queue.lock().await;
                match queue.pending.pop_front() {
                    Some(id) => id,
                    None => {
                        queue.draining = false;
                        // L'evento precede il risveglio di chi attende `wait_idle`
                        self.announce_idle();
                        self.shared.idle_tx.send_replace(true);
                        break;
                    }
                }
            };

            let profile = self.active_profile();
            let outcome = self.shared.runner.run(next, profile).await;
            debug!("Run for {} finished: {:?}", next, outcome);

            if outcome != RunOutcome::Skipped {
                tokio::time::sleep(self.shared.item_pacing).await;
            }
        }
    }

    fn announce_idle(&self) {
        let snapshot = self.shared.store.snapshot();
        let done = snapshot.count(ItemStatus::Done);
        let failed = snapshot.count(ItemStatus::Failed);
        info!("Queue drained: {} done, {} failed, {} total", done, failed, snapshot.len());
        self.publish(SessionEvent::Idle {
            total: snapshot.len(),
            done,
            failed,
        });
    }
}

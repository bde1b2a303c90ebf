//! # State Management Module
//!
//! Questo modulo contiene l'`ItemStateStore`, la mappa autorevole id → stato di ogni item.
//!
//! ## Responsabilità:
//! - Append dei nuovi item (ordine di visualizzazione: newest-first)
//! - Update in-place per id (progresso, esito, artifact)
//! - Rimozione per id con rilascio dell'artifact
//! - Snapshot completi, pubblicati su un canale `watch` ad ogni mutazione
//!
//! ## Consistenza:
//! - Ogni mutazione avviene sotto write lock e pubblica lo snapshot prima di
//!   rilasciarlo: un lettore vede sempre lo stato pre- o post-mutazione
//! - Un update su un id rimosso è un no-op (nessuna resurrezione)
//! - `status == done` ⇔ `progress == 100` e artifact presente: durante un run
//!   il progresso si ferma a `RUNNING_PROGRESS_CAP`, solo `complete` scrive 100
//!
//! ## Ciclo di vita di un item:
//! ```text
//! pending ──► processing ──► done
//!                  │    └───► failed
//!                  ▲
//!   replay ────────┘  (l'artifact precedente viene sostituito solo a run riuscito)
//! ```

use crate::artifact::{ArtifactHandle, ArtifactInfo};
use crate::file_manager::SubmittedFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Progresso massimo visibile finché il run non è `done`
pub const RUNNING_PROGRESS_CAP: u8 = 99;

/// Stable identifier assigned at submission time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl ItemStatus {
    /// Terminal status (done or failed)
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One submitted image and its processing record
#[derive(Debug)]
struct Item {
    id: ItemId,
    /// Submission order, used to replay in the original processing order
    seq: u64,
    name: String,
    source: Option<Arc<[u8]>>,
    original_size: u64,
    compressed_size: Option<u64>,
    artifact: Option<ArtifactHandle>,
    progress: u8,
    status: ItemStatus,
    error: Option<String>,
    runs: u32,
    settled_seq: Option<u64>,
}

impl Item {
    fn view(&self) -> ItemView {
        ItemView {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            progress: self.progress,
            original_size: self.original_size,
            compressed_size: self.compressed_size,
            artifact: self.artifact.as_ref().map(ArtifactHandle::info),
            error: self.error.clone(),
            runs: self.runs,
            settled_seq: self.settled_seq,
            has_source: self.source.is_some(),
        }
    }
}

/// Read-only view of an item, as exposed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub status: ItemStatus,
    pub progress: u8,
    pub original_size: u64,
    pub compressed_size: Option<u64>,
    pub artifact: Option<ArtifactInfo>,
    pub error: Option<String>,
    /// Number of processing runs started for this item
    pub runs: u32,
    /// Store-wide settle order of the last run
    pub settled_seq: Option<u64>,
    pub has_source: bool,
}

/// Full, consistent copy of the store at one revision
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub revision: u64,
    pub items: Arc<Vec<ItemView>>,
}

impl Snapshot {
    pub fn get(&self, id: ItemId) -> Option<&ItemView> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Data handed to a processing run when it starts
#[derive(Debug, Clone)]
pub struct RunStart {
    pub name: String,
    pub source: Arc<[u8]>,
    /// 1-based run counter for this item
    pub run: u32,
}

/// Downloadable artifact of a completed item
#[derive(Debug, Clone)]
pub struct Download {
    pub original_name: String,
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct StoreInner {
    items: Vec<Item>,
    revision: u64,
    next_seq: u64,
    settle_counter: u64,
}

impl StoreInner {
    fn find_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

/// Authoritative mapping item id → lifecycle state
pub struct ItemStateStore {
    inner: RwLock<StoreInner>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Default for ItemStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStateStore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        Self {
            inner: RwLock::new(StoreInner::default()),
            snapshot_tx,
        }
    }

    /// Pubblica lo snapshot corrente; va chiamato con il write lock acquisito
    fn publish(&self, inner: &mut StoreInner) {
        inner.revision += 1;
        let items = inner.items.iter().map(Item::view).collect();
        self.snapshot_tx.send_replace(Snapshot {
            revision: inner.revision,
            items: Arc::new(items),
        });
    }

    /// Receiver notified on every mutation
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Appende un batch in stato `pending`; il batch va in testa, nell'ordine di sottomissione
    pub async fn append(&self, files: Vec<SubmittedFile>) -> Vec<ItemId> {
        if files.is_empty() {
            return Vec::new();
        }

        let mut inner = self.inner.write().await;
        let mut batch = Vec::with_capacity(files.len());

        for file in files {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            batch.push(Item {
                id: ItemId::new(),
                seq,
                original_size: file.size(),
                name: file.name,
                source: Some(file.bytes),
                compressed_size: None,
                artifact: None,
                progress: 0,
                status: ItemStatus::Pending,
                error: None,
                runs: 0,
                settled_seq: None,
            });
        }

        let ids = batch.iter().map(|item| item.id).collect();
        inner.items.splice(0..0, batch);
        self.publish(&mut inner);
        ids
    }

    /// Avvia un processing run e restituisce la sorgente
    ///
    /// The previous artifact (if any) stays downloadable until a new one
    /// replaces it in `complete`. Returns `None` when the item is gone or has
    /// no retained source.
    pub async fn begin_run(&self, id: ItemId) -> Option<RunStart> {
        let mut inner = self.inner.write().await;
        let item = inner.find_mut(id)?;
        let source = item.source.clone()?;

        item.status = ItemStatus::Processing;
        item.progress = 0;
        item.error = None;
        item.settled_seq = None;
        item.runs += 1;
        let start = RunStart {
            name: item.name.clone(),
            source,
            run: item.runs,
        };

        self.publish(&mut inner);
        Some(start)
    }

    /// Aggiorna il progresso di un item in `processing`, senza mai farlo decrescere
    ///
    /// Values are capped at `RUNNING_PROGRESS_CAP`. Returns `false` if the item
    /// no longer exists.
    pub async fn set_progress(&self, id: ItemId, progress: u8) -> bool {
        let mut inner = self.inner.write().await;
        let Some(item) = inner.find_mut(id) else {
            return false;
        };

        let progress = progress.min(RUNNING_PROGRESS_CAP);
        if item.status != ItemStatus::Processing || progress <= item.progress {
            return true;
        }
        item.progress = progress;
        self.publish(&mut inner);
        true
    }

    /// Marca l'item come `done` con il nuovo artifact
    ///
    /// If the item was removed in the meantime the artifact is released and
    /// `false` is returned.
    pub async fn complete(&self, id: ItemId, artifact: ArtifactHandle, retain_source: bool) -> bool {
        let mut inner = self.inner.write().await;
        inner.settle_counter += 1;
        let settled = inner.settle_counter;

        let Some(item) = inner.find_mut(id) else {
            debug!("Discarding {} for removed item {}", artifact.id(), id);
            return false;
        };

        // Il vecchio handle viene rilasciato prima di memorizzare il nuovo
        if let Some(previous) = item.artifact.take() {
            debug!("Releasing superseded {} for {}", previous.id(), item.name);
        }
        item.compressed_size = Some(artifact.size());
        item.artifact = Some(artifact);
        item.progress = 100;
        item.status = ItemStatus::Done;
        item.settled_seq = Some(settled);
        if !retain_source {
            item.source = None;
        }

        self.publish(&mut inner);
        true
    }

    /// Marca l'item come `failed`
    ///
    /// An artifact from an earlier successful run is kept, so a failed replay
    /// does not destroy a valid download.
    pub async fn fail(&self, id: ItemId, error: String) -> bool {
        let mut inner = self.inner.write().await;
        inner.settle_counter += 1;
        let settled = inner.settle_counter;

        let Some(item) = inner.find_mut(id) else {
            return false;
        };

        item.status = ItemStatus::Failed;
        item.error = Some(error);
        item.settled_seq = Some(settled);

        self.publish(&mut inner);
        true
    }

    /// Rimuove l'item; il suo artifact (se presente) viene rilasciato
    pub async fn remove(&self, id: ItemId) -> Option<ItemView> {
        let mut inner = self.inner.write().await;
        let index = inner.items.iter().position(|item| item.id == id)?;
        let item = inner.items.remove(index);
        let view = item.view();
        drop(item);

        self.publish(&mut inner);
        Some(view)
    }

    pub async fn contains(&self, id: ItemId) -> bool {
        self.inner.read().await.items.iter().any(|item| item.id == id)
    }

    /// Item con sorgente conservata, nell'ordine di sottomissione originale
    pub async fn replay_candidates(&self) -> Vec<ItemId> {
        let inner = self.inner.read().await;
        let mut candidates: Vec<(u64, ItemId)> = inner
            .items
            .iter()
            .filter(|item| item.source.is_some())
            .map(|item| (item.seq, item.id))
            .collect();
        candidates.sort_by_key(|(seq, _)| *seq);
        candidates.into_iter().map(|(_, id)| id).collect()
    }

    /// Compressed bytes of a `done` item
    pub async fn download(&self, id: ItemId) -> Option<Download> {
        let inner = self.inner.read().await;
        let item = inner.items.iter().find(|item| item.id == id)?;
        let artifact = item.artifact.as_ref()?;

        Some(Download {
            original_name: item.name.clone(),
            file_name: artifact.info().file_name,
            bytes: artifact.bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactLedger;

    fn file(name: &str, size: usize) -> SubmittedFile {
        SubmittedFile::jpeg(name, vec![7u8; size])
    }

    #[tokio::test]
    async fn test_append_is_newest_first() {
        let store = ItemStateStore::new();
        let first = store.append(vec![file("a.jpg", 10), file("b.jpg", 20)]).await;
        let second = store.append(vec![file("c.jpg", 30)]).await;

        let snapshot = store.snapshot();
        let names: Vec<&str> = snapshot.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["c.jpg", "a.jpg", "b.jpg"]);
        assert!(snapshot.items.iter().all(|i| i.status == ItemStatus::Pending && i.progress == 0));

        // Il replay segue l'ordine di sottomissione
        let replay = store.replay_candidates().await;
        assert_eq!(replay, vec![first[0], first[1], second[0]]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        // Nessun progresso prima dell'avvio del run
        assert!(store.set_progress(id, 10).await);
        assert_eq!(store.snapshot().get(id).unwrap().progress, 0);

        store.begin_run(id).await.unwrap();
        store.set_progress(id, 40).await;
        store.set_progress(id, 20).await;
        assert_eq!(store.snapshot().get(id).unwrap().progress, 40);

        // 100 arriva solo con `complete`
        store.set_progress(id, 100).await;
        assert_eq!(store.snapshot().get(id).unwrap().progress, RUNNING_PROGRESS_CAP);
    }

    #[tokio::test]
    async fn test_failed_item_stays_below_100() {
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        store.begin_run(id).await.unwrap();
        store.set_progress(id, 100).await;
        assert!(store.fail(id, "boom".to_string()).await);

        let view = store.snapshot().get(id).cloned().unwrap();
        assert_eq!(view.status, ItemStatus::Failed);
        assert!(view.progress < 100);
        assert_eq!(view.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_complete_sets_done_invariant() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        store.begin_run(id).await.unwrap();
        assert!(store.complete(id, ledger.allocate("a.jpg", vec![1, 2]), true).await);

        let view = store.snapshot().get(id).cloned().unwrap();
        assert_eq!(view.status, ItemStatus::Done);
        assert_eq!(view.progress, 100);
        assert_eq!(view.compressed_size, Some(2));
        assert_eq!(view.artifact.unwrap().file_name, "compressed-a.jpg");

        let download = store.download(id).await.unwrap();
        assert_eq!(&*download.bytes, &[1, 2]);
    }

    #[tokio::test]
    async fn test_replay_replaces_artifact_on_success() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        store.begin_run(id).await.unwrap();
        store.complete(id, ledger.allocate("a.jpg", vec![1]), true).await;
        assert_eq!(ledger.live(), 1);

        // Durante il replay il vecchio download resta disponibile
        store.begin_run(id).await.unwrap();
        assert_eq!(ledger.released(), 0);
        let view = store.snapshot().get(id).cloned().unwrap();
        assert_eq!(view.status, ItemStatus::Processing);
        assert!(view.progress < 100);
        assert!(view.artifact.is_some());
        assert_eq!(view.runs, 2);

        store.complete(id, ledger.allocate("a.jpg", vec![2, 3]), true).await;
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.live(), 1);
        assert_eq!(&*store.download(id).await.unwrap().bytes, &[2, 3]);
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_previous_artifact() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        store.begin_run(id).await.unwrap();
        store.complete(id, ledger.allocate("a.jpg", vec![1, 2]), true).await;
        store.begin_run(id).await.unwrap();
        store.fail(id, "boom".to_string()).await;

        let view = store.snapshot().get(id).cloned().unwrap();
        assert_eq!(view.status, ItemStatus::Failed);
        assert!(view.progress < 100);
        assert_eq!(view.compressed_size, Some(2));
        assert_eq!(ledger.released(), 0);
        assert_eq!(&*store.download(id).await.unwrap().bytes, &[1, 2]);
    }

    #[tokio::test]
    async fn test_write_after_remove_is_noop() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];
        store.begin_run(id).await.unwrap();

        assert!(store.remove(id).await.is_some());
        let revision = store.snapshot().revision;

        assert!(!store.set_progress(id, 50).await);
        assert!(!store.complete(id, ledger.allocate("a.jpg", vec![1]), true).await);
        assert!(!store.fail(id, "boom".to_string()).await);

        assert!(store.snapshot().is_empty());
        assert_eq!(store.snapshot().revision, revision);
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn test_remove_releases_artifact() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];
        store.begin_run(id).await.unwrap();
        store.complete(id, ledger.allocate("a.jpg", vec![1]), true).await;

        store.remove(id).await.unwrap();
        assert_eq!(ledger.released(), 1);
        assert!(store.remove(id).await.is_none());
        assert_eq!(ledger.released(), 1);
    }

    #[tokio::test]
    async fn test_dropped_source_excluded_from_replay() {
        let ledger = ArtifactLedger::new();
        let store = ItemStateStore::new();
        let ids = store.append(vec![file("a.jpg", 10), file("b.jpg", 10)]).await;
        store.begin_run(ids[0]).await.unwrap();
        store.complete(ids[0], ledger.allocate("a.jpg", vec![1]), false).await;

        assert_eq!(store.replay_candidates().await, vec![ids[1]]);
        assert!(store.begin_run(ids[0]).await.is_none());
        assert!(!store.snapshot().get(ids[0]).unwrap().has_source);
    }

    #[tokio::test]
    async fn test_subscribers_see_every_revision() {
        let store = ItemStateStore::new();
        let mut rx = store.subscribe();
        let id = store.append(vec![file("a.jpg", 10)]).await[0];

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.get(id).unwrap().name, "a.jpg");
    }
}

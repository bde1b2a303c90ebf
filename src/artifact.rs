//! # Artifact Ownership
//!
//! Gestisce il ciclo di vita degli output compressi.
//!
//! ## Responsabilità:
//! - `ArtifactHandle`: possesso esclusivo dei byte compressi di un item
//! - `ArtifactLedger`: conta allocazioni e rilasci per individuare leak
//! - `ArtifactInfo`: vista serializzabile per snapshot e output JSON
//!
//! Un handle viene rilasciato esattamente una volta, quando viene droppato:
//! alla rimozione dell'item, alla sostituzione durante un replay, oppure
//! quando un risultato arriva per un item già rimosso.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(u64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifact-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct LedgerCounters {
    next_id: AtomicU64,
    allocated: AtomicU64,
    released: AtomicU64,
}

/// Registro condiviso di allocazioni/rilasci degli artifact
#[derive(Debug, Clone, Default)]
pub struct ArtifactLedger {
    counters: Arc<LedgerCounters>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alloca un nuovo handle per i byte compressi di `original_name`
    pub fn allocate(&self, original_name: &str, bytes: Vec<u8>) -> ArtifactHandle {
        let id = ArtifactId(self.counters.next_id.fetch_add(1, Ordering::SeqCst));
        self.counters.allocated.fetch_add(1, Ordering::SeqCst);

        let sha256 = hex::encode(Sha256::digest(&bytes));
        debug!("Allocated {} for {} ({} bytes)", id, original_name, bytes.len());

        ArtifactHandle {
            id,
            file_name: download_name(original_name),
            bytes: Arc::from(bytes),
            sha256,
            ledger: self.clone(),
        }
    }

    pub fn allocated(&self) -> u64 {
        self.counters.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Handle ancora vivi
    pub fn live(&self) -> u64 {
        self.allocated().saturating_sub(self.released())
    }

    fn release(&self, id: ArtifactId) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        debug!("Released {}", id);
    }
}

/// Nome del download esposto all'utente
pub fn download_name(original_name: &str) -> String {
    format!("compressed-{}", original_name)
}

/// Exclusive ownership of one compressed output
#[derive(Debug)]
pub struct ArtifactHandle {
    id: ArtifactId,
    file_name: String,
    bytes: Arc<[u8]>,
    sha256: String,
    ledger: ArtifactLedger,
}

impl ArtifactHandle {
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            id: self.id,
            file_name: self.file_name.clone(),
            size: self.size(),
            sha256: self.sha256.clone(),
        }
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        self.ledger.release(self.id);
    }
}

/// Snapshot view of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: ArtifactId,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_released_once_on_drop() {
        let ledger = ArtifactLedger::new();
        let handle = ledger.allocate("a.jpg", vec![1, 2, 3]);
        assert_eq!(ledger.allocated(), 1);
        assert_eq!(ledger.live(), 1);

        drop(handle);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_info_uses_download_name() {
        let ledger = ArtifactLedger::new();
        let handle = ledger.allocate("holiday.jpg", b"abc".to_vec());
        let info = handle.info();

        assert_eq!(info.file_name, "compressed-holiday.jpg");
        assert_eq!(info.size, 3);
        assert_eq!(
            info.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let ledger = ArtifactLedger::new();
        let a = ledger.allocate("a.jpg", vec![]);
        let b = ledger.allocate("a.jpg", vec![]);
        assert_ne!(a.id(), b.id());
    }
}

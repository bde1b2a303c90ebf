//! # JSON Output Module
//!
//! Questo modulo definisce gli eventi di sessione emessi dal `BatchProcessor`.
//!
//! ## Responsabilità:
//! - Definisce `SessionEvent`, serializzato in JSON con tag `type`
//! - Gli eventi viaggiano su un canale `broadcast`: ogni front-end si sottoscrive
//! - `emit()` li scrive come JSON lines su stdout per uso programmatico
//!
//! ## Tipi di messaggi:
//! - `submitted` / `rejected`: Esito dell'intake di un batch
//! - `item_started` / `item_progress`: Avanzamento di un run
//! - `item_done` / `item_failed`: Esito di un run
//! - `item_removed`: Rimozione esplicita
//! - `profile_changed`: Nuovo profilo attivo e numero di item rimessi in coda
//! - `idle`: La coda è vuota

use crate::profile::Profile;
use crate::state::ItemId;
use serde::{Deserialize, Serialize};

/// Capacità del canale broadcast degli eventi
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Batch accettato e accodato
    Submitted {
        accepted: usize,
        rejected: usize,
        profile: String,
    },

    /// File scartati perché fuori dalla famiglia JPEG
    Rejected { count: usize, names: Vec<String> },

    /// Inizio di un processing run
    ItemStarted {
        id: ItemId,
        name: String,
        run: u32,
        profile: String,
    },

    /// Progresso simulato
    ItemProgress { id: ItemId, progress: u8 },

    /// Run completato
    ItemDone {
        id: ItemId,
        name: String,
        file_name: String,
        original_size: u64,
        compressed_size: u64,
        reduction_percent: f64,
    },

    /// Run fallito; il batch prosegue
    ItemFailed {
        id: ItemId,
        name: String,
        error: String,
    },

    /// Item rimosso dall'utente
    ItemRemoved { id: ItemId, name: String },

    /// Profilo cambiato, replay avviato
    ProfileChanged {
        label: String,
        max_size_mb: f64,
        max_dimension: u32,
        replayed: usize,
    },

    /// Coda svuotata
    Idle { total: usize, done: usize, failed: usize },
}

impl SessionEvent {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di cambio profilo
    pub fn profile_changed(profile: &Profile, replayed: usize) -> Self {
        Self::ProfileChanged {
            label: profile.label.clone(),
            max_size_mb: profile.max_size_mb,
            max_dimension: profile.max_dimension,
            replayed,
        }
    }

    /// Id dell'item a cui si riferisce l'evento, se presente
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemStarted { id, .. }
            | Self::ItemProgress { id, .. }
            | Self::ItemDone { id, .. }
            | Self::ItemFailed { id, .. }
            | Self::ItemRemoved { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::QualityTier;

    #[test]
    fn test_events_are_tagged() {
        let event = SessionEvent::Rejected {
            count: 1,
            names: vec!["notes.png".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["count"], 1);

        let id = ItemId::new();
        let progress = serde_json::to_value(SessionEvent::ItemProgress { id, progress: 42 }).unwrap();
        assert_eq!(progress["type"], "item_progress");
        assert_eq!(progress["progress"], 42);
    }

    #[test]
    fn test_profile_changed_round_trip() {
        let event = SessionEvent::profile_changed(&QualityTier::Low.profile(), 3);
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.item_id(), None);
    }
}

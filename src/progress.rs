//! # Progress Rendering and Statistics Module
//!
//! Questo modulo gestisce il rendering su terminale e le statistiche della sessione.
//!
//! ## Responsabilità:
//! - Una progress bar `indicatif` per ogni item, guidata dagli snapshot dello store
//! - Statistiche aggregate (done, failed, byte risparmiati)
//! - Report finale formattato
//!
//! ## Visual feedback:
//! ```text
//! [████████████████████████████████████████] 100% ✅ photo.jpg: 2.10 MB -> 812.40 KB
//! [██████████████████----------------------]  46% photo2.jpg
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let renderer = tokio::spawn(ProgressManager::new().follow(store.subscribe()));
//! // ... sessione ...
//! drop(store);
//! let stats = renderer.await?;
//! ```

use crate::file_manager::FileManager;
use crate::state::{ItemId, ItemStatus, ItemView, Snapshot};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::watch;

/// Renders one progress bar per item from store snapshots
pub struct ProgressManager {
    multi: MultiProgress,
    bars: HashMap<ItemId, ProgressBar>,
    style: ProgressStyle,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    /// Allinea le barre allo snapshot: crea, aggiorna e rimuove
    pub fn render(&mut self, snapshot: &Snapshot) {
        for item in snapshot.items.iter() {
            let bar = self.bars.entry(item.id).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(self.style.clone());
                bar
            });
            bar.set_position(item.progress as u64);
            bar.set_message(Self::message(item));
        }

        let live: Vec<ItemId> = snapshot.items.iter().map(|item| item.id).collect();
        self.bars.retain(|id, bar| {
            let keep = live.contains(id);
            if !keep {
                bar.finish_and_clear();
                self.multi.remove(bar);
            }
            keep
        });
    }

    fn message(item: &ItemView) -> String {
        match item.status {
            ItemStatus::Pending => format!("{} (waiting)", item.name),
            ItemStatus::Processing => item.name.clone(),
            ItemStatus::Done => format!(
                "✅ {}: {} -> {}",
                item.name,
                FileManager::format_size(item.original_size),
                FileManager::format_size(item.compressed_size.unwrap_or_default())
            ),
            ItemStatus::Failed => format!(
                "❌ {}: {}",
                item.name,
                item.error.as_deref().unwrap_or("compression failed")
            ),
        }
    }

    /// Segue lo store fino alla chiusura del canale, poi stampa il riepilogo una volta
    pub async fn follow(mut self, mut snapshots: watch::Receiver<Snapshot>) -> BatchStats {
        let mut last = snapshots.borrow_and_update().clone();
        self.render(&last);
        while snapshots.changed().await.is_ok() {
            last = snapshots.borrow_and_update().clone();
            self.render(&last);
        }
        last = snapshots.borrow().clone();

        let stats = BatchStats::from_snapshot(&last);
        self.finish(&stats.format_summary());
        stats
    }

    /// Chiude tutte le barre e stampa il riepilogo
    pub fn finish(&self, summary: &str) {
        for bar in self.bars.values() {
            bar.abandon();
        }
        let _ = self.multi.println(summary);
    }
}

/// Aggregate statistics over the current batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    /// Original bytes of `done` items
    pub total_original_size: u64,
    pub total_compressed_size: u64,
}

impl BatchStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut stats = Self {
            total: snapshot.len(),
            ..Default::default()
        };

        for item in snapshot.items.iter() {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Done => {
                    stats.done += 1;
                    stats.total_original_size += item.original_size;
                    stats.total_compressed_size += item.compressed_size.unwrap_or(item.original_size);
                }
            }
        }

        stats
    }

    pub fn total_bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_compressed_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.total_original_size, self.total_compressed_size)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Items: {} | Done: {} | Failed: {} | Total saved: {} ({:.2}%)",
            self.total,
            self.done,
            self.failed,
            FileManager::format_size(self.total_bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}

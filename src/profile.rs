//! # Compression Profiles
//!
//! Profili di compressione (quality tier) selezionabili dall'utente.
//!
//! ## Tier disponibili:
//! | Tier   | Max size | Max dimension |
//! |--------|----------|---------------|
//! | high   | 2 MB     | 2560 px       |
//! | medium | 1 MB     | 1920 px       |
//! | low    | 0.5 MB   | 1280 px       |
//!
//! Un solo profilo è attivo alla volta: lo possiede il `BatchProcessor`.

use serde::{Deserialize, Serialize};
use std::fmt;

const MB: f64 = 1024.0 * 1024.0;

/// Quality tier esposto come unica superficie di configurazione esterna
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Medium
    }
}

impl QualityTier {
    pub fn profile(self) -> Profile {
        match self {
            Self::High => Profile::new("High quality", 2.0, 2560),
            Self::Medium => Profile::new("Balanced", 1.0, 1920),
            Self::Low => Profile::new("Small size", 0.5, 1280),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named compression configuration: target max size and max dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub label: String,
    pub max_size_mb: f64,
    pub max_dimension: u32,
}

impl Profile {
    pub fn new(label: impl Into<String>, max_size_mb: f64, max_dimension: u32) -> Self {
        Self {
            label: label.into(),
            max_size_mb,
            max_dimension,
        }
    }

    /// Soglia massima in byte
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * MB) as u64
    }
}

impl From<QualityTier> for Profile {
    fn from(tier: QualityTier) -> Self {
        tier.profile()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (≤ {} MB, ≤ {} px)", self.label, self.max_size_mb, self.max_dimension)
    }
}

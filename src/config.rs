//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della sessione di compressione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con il profilo iniziale e i tempi di pacing
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `profile`: Tier di qualità iniziale (default: medium)
//! - `progress_step`: Incremento del progresso simulato (default: 2)
//! - `progress_tick_ms`: Ritardo tra due valori di progresso (default: 30ms)
//! - `item_pacing_ms`: Pausa tra un item e il successivo (default: 500ms)
//! - `retain_sources`: Conserva i byte originali per il replay (default: true)
//! - `initial_quality` / `min_quality` / `quality_step`: Ricerca qualità JPEG
//! - `max_iterations`: Tentativi massimi di riduzione dimensioni (default: 10)
//! - `json_output`: Eventi JSON su stdout (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     profile: QualityTier::High,
//!     item_pacing_ms: 0,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::CompressError;
use crate::profile::QualityTier;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a compression session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initially active quality tier
    pub profile: QualityTier,
    /// Simulated progress increment (percentage points)
    pub progress_step: u8,
    /// Delay between two simulated progress values
    pub progress_tick_ms: u64,
    /// Delay between an item settling and the next one starting
    pub item_pacing_ms: u64,
    /// Keep source bytes after success so a profile change can replay the item
    pub retain_sources: bool,
    /// First JPEG quality tried (1-100)
    pub initial_quality: u8,
    /// Lowest JPEG quality tried before shrinking dimensions (1-100)
    pub min_quality: u8,
    /// Quality decrement between attempts
    pub quality_step: u8,
    /// Maximum number of dimension reductions
    pub max_iterations: u32,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: QualityTier::Medium,
            progress_step: 2,
            progress_tick_ms: 30,
            item_pacing_ms: 500,
            retain_sources: true,
            initial_quality: 92,
            min_quality: 10,
            quality_step: 10,
            max_iterations: 10,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.progress_step == 0 || self.progress_step > 100 {
            return Err(CompressError::Config("Progress step must be between 1 and 100".to_string()));
        }

        if self.initial_quality == 0 || self.initial_quality > 100 {
            return Err(CompressError::Config("Initial quality must be between 1 and 100".to_string()));
        }

        if self.min_quality == 0 || self.min_quality > self.initial_quality {
            return Err(CompressError::Config(format!(
                "Minimum quality must be between 1 and the initial quality ({})",
                self.initial_quality
            )));
        }

        if self.quality_step == 0 {
            return Err(CompressError::Config("Quality step must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn item_pacing(&self) -> Duration {
        Duration::from_millis(self.item_pacing_ms)
    }

    /// Default location: `<config_dir>/jpeg-compressor/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jpeg-compressor").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.progress_step = 0;
        assert!(matches!(config.validate(), Err(CompressError::Config(_))));

        config.progress_step = 2;
        config.initial_quality = 101;
        assert!(config.validate().is_err());

        config.initial_quality = 80;
        config.min_quality = 90;
        assert!(config.validate().is_err());

        config.min_quality = 10;
        config.quality_step = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.profile, QualityTier::Medium);
        assert_eq!(config.progress_step, 2);
        assert_eq!(config.item_pacing(), Duration::from_millis(500));
        assert!(config.retain_sources);
        assert!(!config.json_output);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            profile: QualityTier::Low,
            progress_tick_ms: 5,
            item_pacing_ms: 0,
            retain_sources: false,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.profile, QualityTier::Low);
        assert_eq!(loaded_config.progress_tick_ms, 5);
        assert_eq!(loaded_config.item_pacing_ms, 0);
        assert!(!loaded_config.retain_sources);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.progress_step, 2);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "profile": "high" }"#).await.unwrap();

        let config = Config::from_file(&path).await.unwrap();
        assert_eq!(config.profile, QualityTier::High);
        assert_eq!(config.item_pacing_ms, 500);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "quality_step": 0 }"#).await.unwrap();

        let err = Config::from_file(&path).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CompressError>(), Some(CompressError::Config(_))));
    }
}

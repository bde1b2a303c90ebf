//! # JPEG Batch Compressor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline di compressione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per qualunque front-end
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `profile`: Tier di qualità (high/medium/low)
//! - `file_manager`: Intake dei file e scrittura download
//! - `artifact`: Possesso e rilascio degli output compressi
//! - `image_processor`: Servizio di compressione JPEG
//! - `state`: Store autorevole dello stato degli item
//! - `pipeline`: Processor sequenziale, run per item, progresso simulato
//! - `json_output`: Eventi di sessione
//! - `progress`: Rendering su terminale e statistiche
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use jpeg_batch_compressor::{BatchProcessor, Config, QualityTier, SubmittedFile};
//!
//! let processor = BatchProcessor::new(Config::default())?;
//! let report = processor.submit(vec![SubmittedFile::jpeg("a.jpg", bytes)]).await;
//! processor.wait_idle().await;
//! processor.change_profile(QualityTier::Low).await;
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod state;

pub use artifact::{ArtifactInfo, ArtifactLedger};
pub use config::Config;
pub use error::CompressError;
pub use file_manager::{FileManager, SubmittedFile};
pub use image_processor::{CompressionService, JpegCompressor};
pub use json_output::SessionEvent;
pub use pipeline::{BatchProcessor, SubmitReport};
pub use profile::{Profile, QualityTier};
pub use state::{ItemId, ItemStateStore, ItemStatus, ItemView, Snapshot};

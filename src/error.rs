//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` enum per categorizzare gli errori della pipeline
//! - Integra con `thiserror` per `Display` e `std::error::Error`
//! - Gli errori per-item non escono mai dal drainer: vengono registrati
//!   sull'item come stato `failed`
//!
//! ## Categorie di errori:
//! - `UnsupportedFileType`: File scartato in ingresso (non JPEG)
//! - `CompressionFailure`: Compressione fallita per un singolo item
//! - `Config`: Parametri di configurazione non validi
//! - `UnknownItem`: Id non presente nello store (item rimosso)
//!
//! ## Esempio:
//! ```rust,ignore
//! if let Err(e) = FileManager::ensure_accepted(&file) {
//!     // CompressError::UnsupportedFileType("notes.png (image/png)")
//!     warn!("{}", e);
//! }
//! ```

use crate::state::ItemId;

/// Custom error types for the compression pipeline
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Compression failed: {0}")]
    CompressionFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),
}

pub type Result<T> = std::result::Result<T, CompressError>;

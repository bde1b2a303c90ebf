//! # File Management Module
//!
//! Questo modulo gestisce l'acquisizione dei file in ingresso e la scrittura dei download.
//!
//! ## Responsabilità:
//! - Filtro dei file accettati (solo famiglia MIME JPEG)
//! - Caricamento file da disco e discovery ricorsiva in directory
//! - Scrittura dei download `compressed-<nome>` in una directory di output
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati accettati:
//! - **MIME**: `image/jpeg` (anche `image/jpg`, `image/pjpeg`)
//! - **Estensioni**: JPG, JPEG (case-insensitive)
//!
//! Un file senza MIME dichiarato viene riconosciuto dai magic bytes.
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_files(Path::new("/photos"))?;
//! for path in files {
//!     let file = FileManager::load(&path).await?;
//!     if FileManager::is_accepted(&file) {
//!         // submit
//!     }
//! }
//! ```

use crate::artifact::download_name;
use crate::error::CompressError;
use anyhow::Result;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use walkdir::WalkDir;

const ACCEPTED_MIME: &[&str] = &["image/jpeg", "image/jpg", "image/pjpeg"];
const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// A user-supplied file, before acceptance filtering
#[derive(Debug, Clone)]
pub struct SubmittedFile {
    /// Original file name (display only)
    pub name: String,
    /// Declared MIME type, if the source provided one
    pub mime: Option<String>,
    pub bytes: Arc<[u8]>,
}

impl SubmittedFile {
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// Shorthand for a file declared as `image/jpeg`
    pub fn jpeg(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(name, Some("image/jpeg"), bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Manages file intake and downloads
pub struct FileManager;

impl FileManager {
    /// Check if a file belongs to the accepted MIME family and extension set
    pub fn is_accepted(file: &SubmittedFile) -> bool {
        let mime_ok = match file.mime.as_deref() {
            Some(mime) => {
                let mime = mime.trim().to_ascii_lowercase();
                ACCEPTED_MIME.contains(&mime.as_str())
            }
            None => matches!(image::guess_format(&file.bytes), Ok(ImageFormat::Jpeg)),
        };

        mime_ok && Self::has_accepted_extension(Path::new(&file.name))
    }

    /// Come `is_accepted`, ma con l'errore da riportare per un file scartato
    pub fn ensure_accepted(file: &SubmittedFile) -> crate::error::Result<()> {
        if Self::is_accepted(file) {
            return Ok(());
        }
        let declared = file.mime.as_deref().unwrap_or("no MIME type");
        Err(CompressError::UnsupportedFileType(format!("{} ({})", file.name, declared)))
    }

    /// Check the extension only
    pub fn has_accepted_extension(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            ACCEPTED_EXTENSIONS.contains(&ext_lower.as_str())
        } else {
            false
        }
    }

    /// Guess the MIME type from the extension
    pub fn mime_for(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            _ => None,
        }
    }

    /// Load a file from disk as a submission
    pub async fn load(path: &Path) -> Result<SubmittedFile> {
        let bytes = fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", path.display()))?;

        Ok(SubmittedFile::new(name, Self::mime_for(path), bytes))
    }

    /// Expand a path into the list of regular files it contains
    pub fn find_files(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.exists() {
            return Err(anyhow::anyhow!("Path does not exist: {}", path.display()));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();

        Ok(files)
    }

    /// Write an artifact as `compressed-<original_name>` inside `output_dir`
    pub async fn write_download(output_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).await?;
        let target = output_dir.join(download_name(original_name));
        fs::write(&target, bytes).await?;
        Ok(target)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_accepts_jpeg_family() {
        assert!(FileManager::is_accepted(&SubmittedFile::jpeg("a.jpg", vec![0u8; 4])));
        assert!(FileManager::is_accepted(&SubmittedFile::new("B.JPEG", Some("image/JPEG"), vec![0u8; 4])));
        assert!(FileManager::is_accepted(&SubmittedFile::new("c.jpg", Some("image/pjpeg"), vec![0u8; 4])));
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(!FileManager::is_accepted(&SubmittedFile::new("a.png", Some("image/png"), vec![0u8; 4])));
        // MIME giusto, estensione sbagliata
        assert!(!FileManager::is_accepted(&SubmittedFile::new("a.gif", Some("image/jpeg"), vec![0u8; 4])));
        // Estensione giusta, MIME sbagliato
        assert!(!FileManager::is_accepted(&SubmittedFile::new("a.jpg", Some("text/plain"), vec![0u8; 4])));
    }

    #[test]
    fn test_ensure_accepted_reports_file() {
        assert!(FileManager::ensure_accepted(&SubmittedFile::jpeg("a.jpg", vec![0u8; 4])).is_ok());

        let err = FileManager::ensure_accepted(&SubmittedFile::new("notes.png", Some("image/png"), vec![0u8; 4]))
            .unwrap_err();
        assert!(matches!(err, CompressError::UnsupportedFileType(_)));
        assert_eq!(err.to_string(), "Unsupported file type: notes.png (image/png)");
    }

    #[test]
    fn test_sniffs_missing_mime() {
        assert!(FileManager::is_accepted(&SubmittedFile::new("a.jpg", None, JPEG_MAGIC.to_vec())));
        assert!(!FileManager::is_accepted(&SubmittedFile::new("a.jpg", None, b"hello".to_vec())));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(200, 50), 75.0);
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
    }

    #[tokio::test]
    async fn test_load_and_find_files() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp_dir.path().join("a.jpg"), JPEG_MAGIC).unwrap();
        std::fs::write(nested.join("b.png"), b"png").unwrap();

        let files = FileManager::find_files(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        let loaded = FileManager::load(&temp_dir.path().join("a.jpg")).await.unwrap();
        assert_eq!(loaded.name, "a.jpg");
        assert_eq!(loaded.mime.as_deref(), Some("image/jpeg"));
        assert_eq!(loaded.size(), JPEG_MAGIC.len() as u64);
    }

    #[tokio::test]
    async fn test_write_download() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");

        let path = FileManager::write_download(&out, "a.jpg", b"data").await.unwrap();

        assert_eq!(path, out.join("compressed-a.jpg"));
        assert_eq!(std::fs::read(path).unwrap(), b"data");
    }
}

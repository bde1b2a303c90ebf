//! # Image Processing Module
//!
//! Questo modulo definisce il contratto del servizio di compressione e la sua
//! implementazione JPEG in-memory basata sul crate `image`.
//!
//! ## Contratto
//!
//! `CompressionService::compress(source, profile)` produce un output compresso
//! oppure fallisce con `CompressError::CompressionFailure`. Il servizio:
//! - non conosce l'identità degli item (è puro rispetto allo store)
//! - non modifica mai i byte sorgente
//! - viene eseguito dal drainer su `spawn_blocking`, come singolo punto di sospensione
//!
//! ## Pipeline di Compressione (`JpegCompressor`)
//!
//! 1. **Decode**: JPEG → `DynamicImage`
//! 2. **Fit**: Downscale Lanczos3 se il lato lungo supera `max_dimension`
//! 3. **Quality search**: Encode partendo da `initial_quality`, scendendo di
//!    `quality_step` fino a `min_quality` finché l'output non rientra in `max_size`
//! 4. **Shrink**: Se non basta, riduce le dimensioni del 10% e riprova
//!    (al massimo `max_iterations` volte)
//! 5. **Guard**: Mai restituire un output più grande della sorgente
//!
//! | Fase          | Fallimento                      |
//! |---------------|---------------------------------|
//! | Decode        | `CompressionFailure`            |
//! | Encode        | `CompressionFailure`            |
//! | Budget mancato| Nessun errore, best effort + warn |
//!
//! ## Esempio
//!
//! ```rust,ignore
//! let compressor = JpegCompressor::from_config(&config);
//! let output = compressor.compress(&bytes, &QualityTier::Medium.profile())?;
//! println!("{} -> {} bytes", bytes.len(), output.bytes.len());
//! ```

use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::profile::Profile;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use tracing::{debug, warn};

/// Fattore di riduzione dimensioni per ogni iterazione di shrink
const SHRINK_FACTOR: f64 = 0.9;

/// Output of a successful compression
#[derive(Debug, Clone)]
pub struct CompressedImage {
    /// Encoded JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality used for the final encode, `None` when the source was kept as is
    pub quality: Option<u8>,
}

/// Servizio di compressione esterno alla pipeline
///
/// Implementations must be pure with respect to the item store: they receive
/// only bytes and a profile and allocate a fresh output on every call.
pub trait CompressionService: Send + Sync {
    fn compress(&self, source: &[u8], profile: &Profile) -> Result<CompressedImage>;
}

/// # JPEG Compressor
///
/// In-memory JPEG recompression using the `image` crate. No external tools are
/// spawned; the whole search runs on the calling thread.
///
/// ## Strategy
/// 1. **Dimension fit** - downscale so the longest edge is at most `max_dimension`
/// 2. **Quality search** - decreasing JPEG quality until the size budget is met
/// 3. **Dimension shrink** - 10% smaller per iteration when quality alone is not enough
/// 4. **Best effort** - if the budget is never met, the smallest encode is returned
#[derive(Debug, Clone)]
pub struct JpegCompressor {
    initial_quality: u8,
    min_quality: u8,
    quality_step: u8,
    max_iterations: u32,
}

impl Default for JpegCompressor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl JpegCompressor {
    /// Creates a compressor from the codec search parameters of `config`.
    ///
    /// # Arguments
    /// * `config` - Session configuration (`initial_quality`, `min_quality`,
    ///   `quality_step`, `max_iterations`)
    ///
    /// # Example
    /// ```rust,ignore
    /// let compressor = JpegCompressor::from_config(&Config::default());
    /// ```
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_quality: config.initial_quality.clamp(1, 100),
            min_quality: config.min_quality.clamp(1, 100),
            quality_step: config.quality_step.max(1),
            max_iterations: config.max_iterations,
        }
    }

    /// Encodes `frame` as JPEG at the given quality.
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - Encoded bytes, or `CompressionFailure` if the encoder fails
    fn encode(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder
                .encode_image(frame)
                .map_err(|e| CompressError::CompressionFailure(format!("JPEG encode failed: {}", e)))?;
        }
        Ok(buffer)
    }

    /// Runs the quality search on one frame.
    ///
    /// # Returns
    /// * `Result<(Vec<u8>, u8, bool)>` - Smallest encode, its quality and whether it fits `max_bytes`
    fn search_quality(&self, frame: &RgbImage, max_bytes: u64) -> Result<(Vec<u8>, u8, bool)> {
        let mut quality = self.initial_quality;
        let mut best: Option<(Vec<u8>, u8)> = None;

        loop {
            let encoded = Self::encode(frame, quality)?;
            let fits = encoded.len() as u64 <= max_bytes;
            debug!(
                "Encoded {}x{} at quality {}: {} bytes (budget {})",
                frame.width(),
                frame.height(),
                quality,
                encoded.len(),
                max_bytes
            );

            if best.as_ref().map_or(true, |(b, _)| encoded.len() < b.len()) {
                best = Some((encoded, quality));
            }

            if fits || quality <= self.min_quality {
                let (bytes, best_quality) = best.unwrap_or_default();
                return Ok((bytes, best_quality, fits));
            }

            quality = quality.saturating_sub(self.quality_step).max(self.min_quality);
        }
    }
}

/// Dimensioni che rientrano in `max_dimension` preservando l'aspect ratio
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return (width, height);
    }

    let scale = max_dimension as f64 / longest as f64;
    scale_dimensions(width, height, scale)
}

fn scale_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

fn render(image: &DynamicImage, (width, height): (u32, u32)) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.to_rgb8()
    } else {
        image.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
    }
}

impl CompressionService for JpegCompressor {
    fn compress(&self, source: &[u8], profile: &Profile) -> Result<CompressedImage> {
        let image = image::load_from_memory_with_format(source, ImageFormat::Jpeg)
            .map_err(|e| CompressError::CompressionFailure(format!("JPEG decode failed: {}", e)))?;

        let (width, height) = image.dimensions();
        let max_bytes = profile.max_size_bytes();
        let mut target = fit_within(width, height, profile.max_dimension);
        let mut best: Option<CompressedImage> = None;

        for iteration in 0..=self.max_iterations {
            let frame = render(&image, target);
            let (bytes, quality, fits) = self.search_quality(&frame, max_bytes)?;

            if best.as_ref().map_or(true, |b| bytes.len() < b.bytes.len()) {
                best = Some(CompressedImage {
                    bytes,
                    width: target.0,
                    height: target.1,
                    quality: Some(quality),
                });
            }

            if fits {
                break;
            }

            if iteration == self.max_iterations {
                warn!(
                    "Size budget of {} bytes not reached after {} iterations, keeping best effort",
                    max_bytes, self.max_iterations
                );
                break;
            }

            target = scale_dimensions(target.0, target.1, SHRINK_FACTOR);
        }

        let best = best.ok_or_else(|| CompressError::CompressionFailure("no output produced".to_string()))?;

        // Mai più grande dell'originale
        if best.bytes.len() >= source.len() {
            debug!(
                "Compressed output ({} bytes) not smaller than source ({} bytes), keeping source",
                best.bytes.len(),
                source.len()
            );
            return Ok(CompressedImage {
                bytes: source.to_vec(),
                width,
                height,
                quality: None,
            });
        }

        Ok(best)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// Genera un JPEG rumoroso (difficile da comprimere) in memoria
    pub(crate) fn noisy_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let frame = RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
            let v = v.wrapping_mul(2_654_435_761);
            Rgb([(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8])
        });
        JpegCompressor::encode(&frame, quality).unwrap()
    }

    fn dimensions_of(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .unwrap()
            .dimensions()
    }

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(4000, 2000, 1920), (1920, 960));
        assert_eq!(fit_within(1000, 3000, 1500), (500, 1500));
        assert_eq!(fit_within(800, 600, 1920), (800, 600));
    }

    #[test]
    fn test_downscales_to_max_dimension() {
        let source = noisy_jpeg(400, 200, 90);
        let profile = Profile::new("test", 10.0, 100);

        let output = JpegCompressor::default().compress(&source, &profile).unwrap();

        assert_eq!((output.width, output.height), (100, 50));
        assert_eq!(dimensions_of(&output.bytes), (100, 50));
        assert!(output.bytes.len() < source.len());
    }

    #[test]
    fn test_meets_size_budget() {
        let source = noisy_jpeg(320, 320, 100);
        let profile = Profile::new("tight", 0.02, 320);

        let output = JpegCompressor::default().compress(&source, &profile).unwrap();

        assert!(output.bytes.len() as u64 <= profile.max_size_bytes());
        assert!(output.bytes.len() < source.len());
    }

    #[test]
    fn test_never_larger_than_source() {
        let source = noisy_jpeg(16, 16, 10);
        let profile = Profile::new("generous", 5.0, 1920);

        let output = JpegCompressor::default().compress(&source, &profile).unwrap();

        assert!(output.bytes.len() <= source.len());
    }

    #[test]
    fn test_source_is_not_mutated() {
        let source = noisy_jpeg(64, 64, 95);
        let copy = source.clone();
        let _ = JpegCompressor::default()
            .compress(&source, &Profile::new("test", 0.01, 32))
            .unwrap();
        assert_eq!(source, copy);
    }

    #[test]
    fn test_garbage_input_fails() {
        let result = JpegCompressor::default().compress(b"definitely not a jpeg", &Profile::new("t", 1.0, 100));
        assert!(matches!(result, Err(CompressError::CompressionFailure(_))));
    }
}

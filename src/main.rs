//! # JPEG Batch Compressor - Session Driver
//!
//! Front-end minimale da terminale per la pipeline: sostituisce la UI interattiva.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento configurazione e selezione del profilo
//! - Sottomissione dei file, rendering del progresso, scrittura dei download
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file/directory, profilo, output, etc.)
//! 2. Configura il logging (INFO o DEBUG, sovrascrivibile con `RUST_LOG`)
//! 3. Carica la configurazione e crea il `BatchProcessor`
//! 4. Sottomette i file e attende che la coda sia vuota
//! 5. Opzionalmente cambia profilo e attende il replay
//! 6. Scrive `compressed-<nome>` nella directory di output
//!
//! ## Esempio di utilizzo:
//! ```bash
//! jpeg-compressor ./photos --profile high --then-profile low --output ./out
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jpeg_batch_compressor::{
    progress::ProgressManager,
    BatchProcessor, Config, FileManager, ItemStatus, QualityTier,
};

#[derive(Parser)]
#[command(name = "jpeg-compressor")]
#[command(about = "Compress a batch of JPEG images to a size/dimension profile")]
struct Args {
    /// Files or directories to submit
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Quality tier
    #[arg(short, long, value_enum)]
    profile: Option<QualityTier>,

    /// Switch to this tier after the first pass and replay the whole batch
    #[arg(long, value_enum)]
    then_profile: Option<QualityTier>,

    /// Directory where compressed-<name> downloads are written
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output session events as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::from_file(&path).await?,
        None => Config::default(),
    };
    if let Some(tier) = args.profile {
        config.profile = tier;
    }
    config.json_output |= args.json;
    let json_output = config.json_output;

    // Carica i file (le directory vengono espanse ricorsivamente)
    let mut files = Vec::new();
    for path in &args.paths {
        for file_path in FileManager::find_files(path)? {
            match FileManager::load(&file_path).await {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping {}: {}", file_path.display(), e),
            }
        }
    }

    let processor = BatchProcessor::new(config)?;

    let renderer = if json_output {
        let mut events = processor.subscribe_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => event.emit(),
                    Err(RecvError::Lagged(skipped)) => warn!("Dropped {} event(s)", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    } else {
        // Il riepilogo viene stampato una sola volta, a sessione chiusa
        let follow = ProgressManager::new().follow(processor.store().subscribe());
        tokio::spawn(async move {
            follow.await;
        })
    };

    let report = processor.submit(files).await;
    if report.rejected > 0 {
        warn!("{} file(s) rejected (only JPEG is accepted)", report.rejected);
    }
    processor.wait_idle().await;

    if let Some(tier) = args.then_profile {
        processor.change_profile(tier).await;
        processor.wait_idle().await;
    }

    let store = processor.store();
    let snapshot = store.snapshot();

    if let Some(ref output_dir) = args.output {
        for item in snapshot.items.iter().filter(|i| i.status == ItemStatus::Done) {
            if let Some(download) = store.download(item.id).await {
                let path = FileManager::write_download(output_dir, &download.original_name, &download.bytes).await?;
                info!("Saved {}", path.display());
            }
        }
    }

    // Chiudere i canali termina il renderer dopo l'ultimo evento
    drop(store);
    drop(processor);
    renderer.await?;

    Ok(())
}

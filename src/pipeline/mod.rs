//! # Pipeline Module
//!
//! Modulo che separa le responsabilità della pipeline sequenziale in sottomoduli:
//! - `batch_processor`: Orchestratore principale (coda, drainer, remove, cambio profilo)
//! - `task_runner`: Run di un singolo item (Simulating → Compressing → Settled)
//! - `progress_simulator`: Progresso simulato a passi fissi

pub mod batch_processor;
pub mod progress_simulator;
pub mod task_runner;

pub use batch_processor::{BatchProcessor, SubmitReport};
pub use progress_simulator::ProgressSimulator;
pub use task_runner::{RunOutcome, TaskRunner};

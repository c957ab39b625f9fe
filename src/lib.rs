//! Client library for the Flux text-to-image API.
//!
//! - [`flux::PromptSubmitter`] sends one prompt and folds any network trouble
//!   into a [`models::GenerationResult`].
//! - [`flux::BatchOrchestrator`] runs many prompts concurrently under a fixed
//!   limit, reports in input order and supports cooperative cancellation.
//! - [`storage::HistoryStore`] keeps an encrypted record of past prompts and
//!   favorites.
//! - [`flux::FluxStudio`] wires the three together for a presenter.

pub mod config;
pub mod error;
pub mod flux;
pub mod logger;
pub mod models;
pub mod storage;

pub use config::{BatchConfig, Config, FluxConfig, HistoryConfig};
pub use error::{FluxError, Result};
pub use flux::{
    BatchHandle, BatchOrchestrator, CancelFlag, FluxImageClient, FluxStudio, GenerationOutcome,
    ImageApi, PromptSubmitter,
};
pub use models::{
    AspectRatio, BatchEvent, BatchItem, BatchJob, BatchReport, GeneratedImage, GenerationRequest,
    GenerationResult, HistoryEntry, ImageFormat, Quality,
};
pub use storage::{EncryptedFileBackend, HistoryBackend, HistoryStore, MemoryBackend};

pub mod image_client;
pub mod orchestrator;
pub mod submitter;
pub mod traits;

use crate::{
    config::Config,
    error::Result,
    models::{BatchJob, BatchReport, GenerationRequest, GenerationResult},
    storage::HistoryStore,
};
use std::sync::Arc;

pub use image_client::FluxImageClient;
pub use orchestrator::{BatchHandle, BatchOrchestrator, CancelFlag};
pub use submitter::PromptSubmitter;
pub use traits::ImageApi;

/// What a presenter gets back from a single generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub result: GenerationResult,
    /// Set when the prompt could not be recorded in history.
    pub history_warning: Option<String>,
}

/// Entry point for presenters: one submitter, one orchestrator and an
/// optional history store, all sharing one API client.
#[derive(Clone)]
pub struct FluxStudio {
    submitter: Arc<PromptSubmitter>,
    orchestrator: BatchOrchestrator,
    history: Option<Arc<HistoryStore>>,
}

impl FluxStudio {
    /// Builds the HTTP client from `config` and opens the history store when
    /// a history key is configured. A history store that cannot be opened is
    /// logged and left out; generation keeps working without it.
    pub async fn new(config: &Config) -> Result<Self> {
        let api: Arc<dyn ImageApi> = Arc::new(FluxImageClient::new(&config.flux)?);
        let mut studio = Self::with_api(api, config)?;

        if config.history.is_enabled() {
            match HistoryStore::open(&config.history).await {
                Ok(store) => studio.history = Some(Arc::new(store)),
                Err(e) => log::warn!("Continuing without history: {}", e),
            }
        } else {
            log::info!("FLUX_HISTORY_KEY not set, prompt history disabled");
        }

        Ok(studio)
    }

    /// Uses any [`ImageApi`] implementation and no history store.
    pub fn with_api(api: Arc<dyn ImageApi>, config: &Config) -> Result<Self> {
        let submitter = Arc::new(PromptSubmitter::new(api, &config.flux));
        let orchestrator = BatchOrchestrator::new(submitter.clone(), &config.batch)?;

        Ok(Self {
            submitter,
            orchestrator,
            history: None,
        })
    }

    pub fn with_history_store(mut self, store: HistoryStore) -> Self {
        self.history = Some(Arc::new(store));
        self
    }

    pub fn submitter(&self) -> &PromptSubmitter {
        &self.submitter
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_deref()
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let result = self.submitter.submit(request).await?;
        let history_warning = if result.is_success() {
            self.record(request.prompt()).await
        } else {
            None
        };

        Ok(GenerationOutcome {
            result,
            history_warning,
        })
    }

    /// Starts a batch in the background. Prompts are not recorded in history;
    /// pass the finished report to [`FluxStudio::record_batch`] for that.
    pub fn start_batch(&self, job: BatchJob) -> Result<BatchHandle> {
        self.orchestrator.start(job)
    }

    /// Runs a batch to completion and records every successful prompt.
    /// Returns the report together with any history warnings.
    pub async fn run_batch(&self, job: BatchJob) -> Result<(BatchReport, Vec<String>)> {
        let report = self.orchestrator.run(job).await?;
        let warnings = self.record_batch(&report).await;
        Ok((report, warnings))
    }

    pub async fn record_batch(&self, report: &BatchReport) -> Vec<String> {
        let mut warnings = Vec::new();
        for item in report.items.iter().filter(|item| item.result.is_success()) {
            if let Some(warning) = self.record(&item.prompt).await {
                warnings.push(warning);
            }
        }
        warnings
    }

    async fn record(&self, prompt: &str) -> Option<String> {
        let store = self.history.as_ref()?;
        match store.add(prompt).await {
            Ok(_) => None,
            Err(e) => {
                log::warn!("Could not record prompt in history: {}", e);
                Some(e.to_string())
            }
        }
    }
}

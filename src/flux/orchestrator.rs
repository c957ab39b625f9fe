//! Concurrent batch generation.
//!
//! Submissions start in input order, at most `concurrency` at a time. Each
//! spawned task owns exactly one result slot, so collecting the report needs
//! no locking: the driver awaits the join handles in input order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    config::BatchConfig,
    error::{FluxError, Result},
    flux::submitter::PromptSubmitter,
    models::{BatchEvent, BatchItem, BatchJob, BatchReport, GenerationRequest, GenerationResult},
};

/// Shared cancellation flag. Checked between submissions, never mid-request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    submitter: Arc<PromptSubmitter>,
    concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(submitter: Arc<PromptSubmitter>, config: &BatchConfig) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(FluxError::Config(
                "batch concurrency must be at least 1".into(),
            ));
        }

        Ok(Self {
            submitter,
            concurrency: config.concurrency,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts the batch in the background and returns a handle for progress,
    /// cancellation and the final report. Every prompt is validated first; an
    /// invalid one rejects the whole batch before anything is sent.
    pub fn start(&self, job: BatchJob) -> Result<BatchHandle> {
        self.submitter.validate_job(&job)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();

        let driver = BatchDriver {
            submitter: self.submitter.clone(),
            semaphore: Arc::new(Semaphore::new(self.concurrency)),
            cancel: cancel.clone(),
            events: events_tx,
        };
        let task = tokio::spawn(driver.run(job));

        Ok(BatchHandle {
            events: Some(events_rx),
            cancel,
            task,
        })
    }

    /// Runs the batch to completion, discarding progress events.
    pub async fn run(&self, job: BatchJob) -> Result<BatchReport> {
        self.start(job)?.wait().await
    }
}

pub struct BatchHandle {
    events: Option<mpsc::UnboundedReceiver<BatchEvent>>,
    cancel: CancelFlag,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Requests cancellation. In-flight submissions still finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Non-blocking poll for the next progress event.
    pub fn try_next_event(&mut self) -> Option<BatchEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    /// Takes the event receiver as a stream. Later calls return `None`.
    pub fn events(&mut self) -> Option<UnboundedReceiverStream<BatchEvent>> {
        self.events.take().map(UnboundedReceiverStream::new)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<BatchReport> {
        self.task
            .await
            .map_err(|e| FluxError::Internal(format!("batch driver stopped: {}", e)))
    }
}

struct BatchDriver {
    submitter: Arc<PromptSubmitter>,
    semaphore: Arc<Semaphore>,
    cancel: CancelFlag,
    events: mpsc::UnboundedSender<BatchEvent>,
}

impl BatchDriver {
    fn emit(&self, event: BatchEvent) {
        // The presenter may have stopped listening; the batch carries on.
        let _ = self.events.send(event);
    }

    async fn run(self, job: BatchJob) -> BatchReport {
        let started_at = Instant::now();
        let total = job.len();
        log::info!(
            "Starting batch {} with {} prompts (concurrency {})",
            job.id,
            total,
            self.semaphore.available_permits()
        );
        self.emit(BatchEvent::Started {
            job_id: job.id,
            total,
        });

        let mut slots: Vec<(usize, String, JoinHandle<GenerationResult>)> =
            Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, request) in job.requests.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // A slot may have taken a while to free up; look again.
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let prompt = request.prompt().to_string();
            self.emit(BatchEvent::Submitted {
                index,
                prompt: prompt.clone(),
            });

            let submitter = self.submitter.clone();
            let events = self.events.clone();
            let handle = tokio::spawn(async move {
                let result = submit_one(&submitter, &request).await;
                drop(permit);
                let _ = events.send(BatchEvent::Completed {
                    index,
                    success: result.is_success(),
                    reason: result.reason().map(str::to_string),
                });
                result
            });
            slots.push((index, prompt, handle));
        }

        let started = slots.len();
        if cancelled {
            log::warn!(
                "Batch {} cancelled after {} of {} submissions started",
                job.id,
                started,
                total
            );
            self.emit(BatchEvent::CancelRequested { started });
        }

        let mut items = Vec::with_capacity(started);
        for (index, prompt, handle) in slots {
            let result = handle.await.unwrap_or_else(|e| {
                GenerationResult::failure(format!("submission task failed: {}", e))
            });
            items.push(BatchItem {
                index,
                prompt,
                result,
            });
        }

        let report = BatchReport {
            job_id: job.id,
            items,
            cancelled,
            skipped: total - started,
            elapsed: started_at.elapsed(),
        };

        log::info!(
            "Batch {} finished: {} succeeded, {} failed, {} skipped in {:.2?}",
            report.job_id,
            report.succeeded(),
            report.failed(),
            report.skipped,
            report.elapsed
        );
        self.emit(BatchEvent::Finished {
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped,
        });

        report
    }
}

async fn submit_one(submitter: &PromptSubmitter, request: &GenerationRequest) -> GenerationResult {
    match submitter.submit(request).await {
        Ok(result) => result,
        Err(e) => GenerationResult::failure(e.to_string()),
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::image::{AspectRatio, GenerationRequest, GenerationResult, Quality};
use crate::error::{FluxError, Result};

/// An ordered set of prompts that share one aspect ratio and quality.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: Uuid,
    pub requests: Vec<GenerationRequest>,
    pub created_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new<I, S>(prompts: I, aspect_ratio: AspectRatio, quality: Quality) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requests = prompts
            .into_iter()
            .enumerate()
            .map(|(index, prompt)| {
                GenerationRequest::new(prompt, aspect_ratio, quality).map_err(|e| match e {
                    FluxError::Validation(msg) => {
                        FluxError::Validation(format!("prompt #{}: {}", index + 1, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if requests.is_empty() {
            return Err(FluxError::Validation("batch contains no prompts".into()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            requests,
            created_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub index: usize,
    pub prompt: String,
    pub result: GenerationResult,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub job_id: Uuid,
    /// One entry per started submission, in input order.
    pub items: Vec<BatchItem>,
    pub cancelled: bool,
    /// Prompts never started because the batch was cancelled.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn total(&self) -> usize {
        self.items.len() + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        job_id: Uuid,
        total: usize,
    },
    Submitted {
        index: usize,
        prompt: String,
    },
    Completed {
        index: usize,
        success: bool,
        reason: Option<String>,
    },
    CancelRequested {
        started: usize,
    },
    Finished {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_preserves_prompt_order() {
        let job = BatchJob::new(["one", "two", "three"], AspectRatio::Square, Quality::High).unwrap();
        let prompts: Vec<_> = job.requests.iter().map(|r| r.prompt()).collect();
        assert_eq!(prompts, vec!["one", "two", "three"]);
        assert!(job.requests.iter().all(|r| r.quality() == Quality::High));
    }

    #[test]
    fn test_job_names_the_invalid_prompt() {
        let err = BatchJob::new(["fine", "  "], AspectRatio::Square, Quality::Standard).unwrap_err();
        match err {
            FluxError::Validation(msg) => assert!(msg.starts_with("prompt #2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_job_is_rejected() {
        let prompts: Vec<String> = Vec::new();
        assert!(matches!(
            BatchJob::new(prompts, AspectRatio::Square, Quality::Standard),
            Err(FluxError::Validation(_))
        ));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(BatchEvent::CancelRequested { started: 2 }).unwrap();
        assert_eq!(json["event"], "cancel_requested");
        assert_eq!(json["started"], 2);
    }
}

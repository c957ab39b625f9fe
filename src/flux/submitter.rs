use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::FluxConfig,
    error::{FluxError, Result},
    flux::traits::ImageApi,
    logger,
    models::{BatchJob, GenerationRequest, GenerationResult},
};

/// Sends one request to an [`ImageApi`] and turns whatever comes back into a
/// [`GenerationResult`].
#[derive(Clone)]
pub struct PromptSubmitter {
    api: Arc<dyn ImageApi>,
    max_prompt_chars: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl PromptSubmitter {
    pub fn new(api: Arc<dyn ImageApi>, config: &FluxConfig) -> Self {
        Self {
            api,
            max_prompt_chars: config.max_prompt_chars,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    /// Checks the request against local limits. Runs before any network call.
    pub fn validate(&self, request: &GenerationRequest) -> Result<()> {
        let chars = request.prompt().chars().count();
        if chars == 0 {
            return Err(FluxError::Validation("prompt cannot be empty".into()));
        }
        if chars > self.max_prompt_chars {
            return Err(FluxError::Validation(format!(
                "prompt too long ({} characters, max {})",
                chars, self.max_prompt_chars
            )));
        }
        Ok(())
    }

    /// Validates every request of a batch before any of them is sent. The
    /// error names the first offending prompt by position.
    pub fn validate_job(&self, job: &BatchJob) -> Result<()> {
        for (index, request) in job.requests.iter().enumerate() {
            self.validate(request).map_err(|e| match e {
                FluxError::Validation(msg) => {
                    FluxError::Validation(format!("prompt #{}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Validation problems come back as `Err`; everything that goes wrong on
    /// the network side is folded into `GenerationResult::Failure`.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.validate(request)?;

        let _timer = logger::timer(&format!("{} generation", self.api.name()));
        let mut attempt = 0;
        loop {
            match self.api.generate(request).await {
                Ok(image) if image.size() > 0 => return Ok(GenerationResult::Success(image)),
                Ok(_) => {
                    return Ok(GenerationResult::failure(
                        FluxError::Decode("image payload is empty".into()).to_string(),
                    ))
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Generation attempt failed ({}), retrying {}/{} in {:?}",
                        e,
                        attempt,
                        self.max_retries,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    log::error!("Generation failed: {}", e);
                    return Ok(GenerationResult::failure(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{image::sample_png, AspectRatio, GeneratedImage, Quality};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a script of outcomes, one per call.
    struct ScriptedApi {
        script: Mutex<Vec<Result<GeneratedImage>>>,
        calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(mut script: Vec<Result<GeneratedImage>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageApi for ScriptedApi {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FluxError::Network("script exhausted".into())))
        }
    }

    fn png() -> GeneratedImage {
        GeneratedImage::decode(sample_png(4, 4), None).unwrap()
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt, AspectRatio::Square, Quality::Standard).unwrap()
    }

    fn config() -> FluxConfig {
        FluxConfig::new().with_retries(0, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_carries_image() {
        let api = ScriptedApi::new(vec![Ok(png())]);
        let submitter = PromptSubmitter::new(api.clone(), &config());

        let result = submitter.submit(&request("a cat")).await.unwrap();
        let image = result.image().expect("success");
        assert!(image.size() > 0);
        assert!(result.reason().is_none());
    }

    #[tokio::test]
    async fn test_network_error_becomes_failure_without_retry() {
        let api = ScriptedApi::new(vec![Err(FluxError::Network("HTTP 502".into())), Ok(png())]);
        let submitter = PromptSubmitter::new(api.clone(), &config());

        let result = submitter.submit(&request("a cat")).await.unwrap();
        assert!(result.reason().unwrap().contains("HTTP 502"));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_retry_for_transient_errors() {
        let api = ScriptedApi::new(vec![Err(FluxError::Network("reset".into())), Ok(png())]);
        let submitter = PromptSubmitter::new(
            api.clone(),
            &FluxConfig::new().with_retries(1, Duration::from_millis(1)),
        );

        let result = submitter.submit(&request("a cat")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_moderation_is_never_retried() {
        let api = ScriptedApi::new(vec![Err(FluxError::Moderated("Content Moderated".into()))]);
        let submitter = PromptSubmitter::new(
            api.clone(),
            &FluxConfig::new().with_retries(3, Duration::from_millis(1)),
        );

        let result = submitter.submit(&request("a cat")).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_polling_timeout_is_never_retried() {
        let api = ScriptedApi::new(vec![Err(FluxError::Timeout(10)), Ok(png())]);
        let submitter = PromptSubmitter::new(
            api.clone(),
            &FluxConfig::new().with_retries(3, Duration::from_millis(1)),
        );

        let result = submitter.submit(&request("a cat")).await.unwrap();
        assert!(result.reason().unwrap().contains("10 polling attempts"));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate_job_names_the_offending_prompt() {
        let submitter = PromptSubmitter::new(
            ScriptedApi::new(vec![]),
            &FluxConfig::new().with_max_prompt_chars(10),
        );
        let job = BatchJob::new(
            ["ok", "this prompt is far too long", "fine"],
            AspectRatio::Square,
            Quality::Standard,
        )
        .unwrap();

        match submitter.validate_job(&job) {
            Err(FluxError::Validation(msg)) => {
                assert!(msg.starts_with("prompt #2:"), "{msg}");
                assert!(msg.contains("too long"));
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlong_prompt_fails_before_network() {
        let api = ScriptedApi::new(vec![Ok(png())]);
        let submitter =
            PromptSubmitter::new(api.clone(), &FluxConfig::new().with_max_prompt_chars(10));

        let err = submitter
            .submit(&request("a prompt that is far too long"))
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}

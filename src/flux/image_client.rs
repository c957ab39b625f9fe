use crate::{
    config::FluxConfig,
    error::{FluxError, Result},
    flux::traits::ImageApi,
    models::{
        FluxPollResponse, FluxSubmitPayload, FluxSubmitResponse, GeneratedImage,
        GenerationRequest, ImageFormat, PollStatus,
    },
};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Response,
};
use std::time::Duration;

const ERROR_BODY_EXCERPT: usize = 200;

/// HTTP client for the asynchronous Flux API: submit, poll until ready,
/// download the sample.
#[derive(Clone)]
pub struct FluxImageClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
    poll_interval: Duration,
    max_poll_attempts: u32,
    output_format: ImageFormat,
    safety_tolerance: u8,
    raw: bool,
}

impl FluxImageClient {
    pub fn new(config: &FluxConfig) -> Result<Self> {
        let api_key = config.require_api_key()?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key).map_err(|_| {
            FluxError::Config("API key contains characters not allowed in a header".into())
        })?;
        key.set_sensitive(true);
        headers.insert("x-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FluxError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            headers,
            poll_interval: config.poll_interval,
            max_poll_attempts: config.max_poll_attempts.max(1),
            output_format: config.output_format,
            safety_tolerance: config.safety_tolerance,
            raw: config.raw,
        })
    }

    /// Starts a generation task and returns its polling URL.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<String> {
        let payload = FluxSubmitPayload {
            prompt: request.prompt(),
            aspect_ratio: request.aspect_ratio(),
            output_format: self.output_format,
            quality: request.quality(),
            safety_tolerance: self.safety_tolerance,
            raw: self.raw,
        };

        log::info!(
            "Submitting prompt ({} chars, {}, {}) to {}",
            request.prompt().chars().count(),
            request.aspect_ratio(),
            request.quality(),
            self.base_url
        );

        let response = self
            .client
            .post(&self.base_url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| FluxError::Network(format!("submit request failed: {}", e)))?;
        let response = ensure_success(response, "submit").await?;

        let body: FluxSubmitResponse = response
            .json()
            .await
            .map_err(|e| FluxError::Decode(format!("invalid submit response: {}", e)))?;

        if let Some(id) = &body.id {
            log::debug!("Generation task accepted: {}", id);
        }

        body.polling_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| FluxError::Decode("No polling URL received from API".into()))
    }

    /// Polls until the task is ready and returns the sample URL.
    pub async fn poll(&self, polling_url: &str) -> Result<String> {
        for attempt in 1..=self.max_poll_attempts {
            let response = self
                .client
                .get(polling_url)
                .headers(self.headers.clone())
                .send()
                .await
                .map_err(|e| FluxError::Network(format!("poll request failed: {}", e)))?;
            let response = ensure_success(response, "poll").await?;

            let poll: FluxPollResponse = response
                .json()
                .await
                .map_err(|e| FluxError::Decode(format!("invalid poll response: {}", e)))?;

            log::debug!(
                "Poll attempt {}/{}: {:?}",
                attempt,
                self.max_poll_attempts,
                poll.status
            );

            match &poll.status {
                PollStatus::Ready => {
                    return poll.sample_url().map(str::to_string).ok_or_else(|| {
                        FluxError::Decode("ready response carried no sample URL".into())
                    });
                }
                PollStatus::Moderated(status) => {
                    return Err(FluxError::Moderated(format!(
                        "{}: content moderated as unsafe",
                        status
                    )));
                }
                PollStatus::Failed(status) => {
                    return Err(FluxError::Network(format!(
                        "generation failed with status '{}'",
                        status
                    )));
                }
                PollStatus::Pending => {}
            }

            if attempt < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(FluxError::Timeout(self.max_poll_attempts))
    }

    /// Fetches the finished image and inspects its format and size.
    pub async fn download(&self, sample_url: &str) -> Result<GeneratedImage> {
        let response = self
            .client
            .get(sample_url)
            .send()
            .await
            .map_err(|e| FluxError::Network(format!("image download failed: {}", e)))?;
        let response = ensure_success(response, "download").await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FluxError::Network(format!("image download interrupted: {}", e)))?;

        let image = GeneratedImage::decode(bytes.to_vec(), Some(sample_url.to_string()))?;
        log::info!(
            "Downloaded {} image {}x{} ({} bytes)",
            image.format,
            image.width,
            image.height,
            image.size()
        );
        Ok(image)
    }
}

#[async_trait]
impl ImageApi for FluxImageClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let polling_url = self.submit(request).await?;
        let sample_url = self.poll(&polling_url).await?;
        self.download(&sample_url).await
    }

    fn name(&self) -> &str {
        "flux"
    }
}

async fn ensure_success(response: Response, stage: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    Err(FluxError::Network(format!(
        "{} returned HTTP {}: {}",
        stage,
        status,
        excerpt.trim()
    )))
}

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{FluxError, Result};
use crate::models::ImageFormat;

pub const DEFAULT_API_URL: &str = "https://api.us1.bfl.ai/v1/flux-pro-1.1-ultra";

// Debug is hand-written for the config structs so secrets never reach a log line.
#[derive(Clone)]
pub struct FluxConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub output_format: ImageFormat,
    pub safety_tolerance: u8,
    pub raw: bool,
    pub max_prompt_chars: usize,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
}

#[derive(Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub flux: FluxConfig,
    pub batch: BatchConfig,
    pub history: HistoryConfig,
}

impl Default for FluxConfig {
    fn default() -> Self {
        FluxConfig {
            api_key: None,
            base_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 10,
            request_timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_delay: Duration::from_secs(5),
            output_format: ImageFormat::Jpeg,
            safety_tolerance: 6,
            raw: true,
            max_prompt_chars: 5000,
        }
    }
}

impl std::fmt::Debug for FluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluxConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("output_format", &self.output_format)
            .field("safety_tolerance", &self.safety_tolerance)
            .field("raw", &self.raw)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish()
    }
}

impl FluxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(FluxConfig {
            api_key: env::var("FLUX_API_KEY").ok().filter(|key| !key.trim().is_empty()),
            base_url: env::var("FLUX_API_URL").unwrap_or(defaults.base_url),
            poll_interval: parse_env::<u64>("FLUX_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_poll_attempts: parse_env("FLUX_MAX_POLL_ATTEMPTS")?
                .unwrap_or(defaults.max_poll_attempts),
            request_timeout: parse_env::<u64>("FLUX_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_retries: parse_env("FLUX_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay: parse_env::<u64>("FLUX_RETRY_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            output_format: parse_env("FLUX_OUTPUT_FORMAT")?.unwrap_or(defaults.output_format),
            safety_tolerance: parse_env("FLUX_SAFETY_TOLERANCE")?
                .unwrap_or(defaults.safety_tolerance),
            raw: parse_env("FLUX_RAW")?.unwrap_or(defaults.raw),
            max_prompt_chars: parse_env("FLUX_MAX_PROMPT_CHARS")?
                .unwrap_or(defaults.max_prompt_chars),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_output_format(mut self, format: ImageFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }

    /// The API key, or a configuration error when none was supplied.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| FluxError::Config("FLUX_API_KEY environment variable not set".into()))
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { concurrency: 4 }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let concurrency = parse_env("FLUX_BATCH_CONCURRENCY")?.unwrap_or(4);
        Ok(BatchConfig { concurrency })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            path: default_history_path(),
            secret: None,
        }
    }
}

impl std::fmt::Debug for HistoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryConfig")
            .field("path", &self.path)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let path = env::var("FLUX_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_history_path());
        let secret = env::var("FLUX_HISTORY_KEY")
            .ok()
            .filter(|secret| !secret.is_empty());

        HistoryConfig { path, secret }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Config {
            flux: FluxConfig::from_env()?,
            batch: BatchConfig::from_env()?,
            history: HistoryConfig::from_env(),
        })
    }

    pub fn with_flux(mut self, config: FluxConfig) -> Self {
        self.flux = config;
        self
    }

    pub fn with_batch(mut self, config: BatchConfig) -> Self {
        self.batch = config;
        self
    }

    pub fn with_history(mut self, config: HistoryConfig) -> Self {
        self.history = config;
        self
    }
}

fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("fluxgen").join("history.enc"))
        .unwrap_or_else(|| PathBuf::from("fluxgen_history.enc"))
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FluxError::Config(format!("invalid value for {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

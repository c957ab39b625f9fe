use serde::{Deserialize, Serialize};

use super::image::{AspectRatio, ImageFormat, Quality};

/// Body of the initial generation request.
#[derive(Debug, Clone, Serialize)]
pub struct FluxSubmitPayload<'a> {
    pub prompt: &'a str,
    pub aspect_ratio: AspectRatio,
    pub output_format: ImageFormat,
    pub quality: Quality,
    pub safety_tolerance: u8,
    pub raw: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluxSubmitResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub polling_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluxPollResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: PollStatus,
    #[serde(default)]
    pub result: Option<FluxPollResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluxPollResult {
    #[serde(default)]
    pub sample: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PollStatus {
    Ready,
    Pending,
    Moderated(String),
    Failed(String),
}

impl From<String> for PollStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "Ready" => PollStatus::Ready,
            "Request Moderated" | "Content Moderated" => PollStatus::Moderated(status),
            "Error" | "Failed" | "Task not found" => PollStatus::Failed(status),
            _ => PollStatus::Pending,
        }
    }
}

impl FluxPollResponse {
    pub fn sample_url(&self) -> Option<&str> {
        self.result.as_ref().and_then(|result| result.sample.as_deref())
    }
}

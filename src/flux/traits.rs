use async_trait::async_trait;

use crate::{
    error::Result,
    models::{GeneratedImage, GenerationRequest},
};

/// A remote text-to-image service.
///
/// One call is one generation: implementations own whatever submit, poll and
/// download round trips the service needs and hand back the decoded image.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Short label used in log lines.
    fn name(&self) -> &str {
        "image-api"
    }
}

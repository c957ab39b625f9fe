use crate::{error::Result, models::HistoryDocument};
use async_trait::async_trait;

/// Durable home of the history document.
///
/// `save` must be all-or-nothing: after an error the previously saved
/// document is still what `load` returns.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn load(&self) -> Result<HistoryDocument>;
    async fn save(&self, document: &HistoryDocument) -> Result<()>;

    fn describe(&self) -> String;
}

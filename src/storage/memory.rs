use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    error::{FluxError, Result},
    models::HistoryDocument,
    storage::traits::HistoryBackend,
};

/// Keeps the document in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    document: Mutex<HistoryDocument>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryBackend for MemoryBackend {
    async fn load(&self) -> Result<HistoryDocument> {
        self.document
            .lock()
            .map(|doc| doc.clone())
            .map_err(|_| FluxError::StoreUnavailable("memory backend poisoned".into()))
    }

    async fn save(&self, document: &HistoryDocument) -> Result<()> {
        let mut guard = self
            .document
            .lock()
            .map_err(|_| FluxError::StoreUnavailable("memory backend poisoned".into()))?;
        *guard = document.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

pub mod cipher;
pub mod encrypted_file;
pub mod memory;
pub mod traits;

use crate::{
    config::HistoryConfig,
    error::{FluxError, Result},
    models::{HistoryDocument, HistoryEntry},
};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub use encrypted_file::EncryptedFileBackend;
pub use memory::MemoryBackend;
pub use traits::HistoryBackend;

/// Prompt history with favorites.
///
/// Every mutation is persisted before it becomes visible: the change is made
/// on a copy, handed to the backend, and only then swapped in. Writers are
/// serialized by the async mutex, which is held across the save.
pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Opens the encrypted history file described by `config`.
    pub async fn open(config: &HistoryConfig) -> Result<Self> {
        let secret = config.secret.as_deref().ok_or_else(|| {
            FluxError::Config("FLUX_HISTORY_KEY is required for encrypted history".into())
        })?;
        let backend = EncryptedFileBackend::open(&config.path, secret).await?;
        Self::with_backend(Arc::new(backend)).await
    }

    pub async fn with_backend(backend: Arc<dyn HistoryBackend>) -> Result<Self> {
        let document = backend.load().await?;
        log::info!(
            "History loaded from {} ({} entries)",
            backend.describe(),
            document.entries.len()
        );

        Ok(Self {
            backend,
            entries: Mutex::new(document.entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends `prompt` unless it is already present. Returns whether an
    /// entry was inserted.
    pub async fn add(&self, prompt: &str) -> Result<bool> {
        let prompt = normalize(prompt)?;
        let mut guard = self.entries.lock().await;
        if guard.iter().any(|entry| entry.prompt == prompt) {
            return Ok(false);
        }

        let mut next = guard.clone();
        next.push(HistoryEntry::new(prompt));
        self.commit(&mut guard, next).await?;
        Ok(true)
    }

    /// Flips the favorite flag and returns its new value.
    pub async fn toggle_favorite(&self, prompt: &str) -> Result<bool> {
        let prompt = normalize(prompt)?;
        let mut guard = self.entries.lock().await;
        let position = find(&guard, prompt)?;

        let mut next = guard.clone();
        next[position].favorite = !next[position].favorite;
        let favorite = next[position].favorite;
        self.commit(&mut guard, next).await?;
        Ok(favorite)
    }

    pub async fn remove(&self, prompt: &str) -> Result<HistoryEntry> {
        let prompt = normalize(prompt)?;
        let mut guard = self.entries.lock().await;
        let position = find(&guard, prompt)?;

        let mut next = guard.clone();
        let removed = next.remove(position);
        self.commit(&mut guard, next).await?;
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.entries.lock().await;
        self.commit(&mut guard, Vec::new()).await
    }

    /// Up to `n` entries, most recently added first.
    pub async fn list_recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.entries.lock().await.iter().rev().take(n).cloned().collect()
    }

    /// Favorites, most recently added first.
    pub async fn list_favorites(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .rev()
            .filter(|entry| entry.favorite)
            .cloned()
            .collect()
    }

    pub async fn contains(&self, prompt: &str) -> bool {
        let prompt = prompt.trim();
        self.entries.lock().await.iter().any(|entry| entry.prompt == prompt)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn commit(
        &self,
        guard: &mut MutexGuard<'_, Vec<HistoryEntry>>,
        next: Vec<HistoryEntry>,
    ) -> Result<()> {
        let document = HistoryDocument { entries: next };
        self.backend.save(&document).await?;
        **guard = document.entries;
        Ok(())
    }
}

fn normalize(prompt: &str) -> Result<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(FluxError::Validation("prompt cannot be empty".into()));
    }
    Ok(prompt)
}

fn find(entries: &[HistoryEntry], prompt: &str) -> Result<usize> {
    entries
        .iter()
        .position(|entry| entry.prompt == prompt)
        .ok_or_else(|| FluxError::NotFound(prompt.to_string()))
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    error::{FluxError, Result},
    models::HistoryDocument,
    storage::{
        cipher::{HistoryCipher, SealedEnvelope},
        traits::HistoryBackend,
    },
};

/// History kept in a single encrypted JSON envelope on disk.
pub struct EncryptedFileBackend {
    path: PathBuf,
    cipher: HistoryCipher,
}

impl EncryptedFileBackend {
    /// Reuses the salt of an existing file so the same secret keeps opening
    /// it; a missing file gets a fresh salt on first save.
    pub async fn open(path: impl Into<PathBuf>, secret: &str) -> Result<Self> {
        let path = path.into();
        let salt = match read_envelope(&path).await? {
            Some(envelope) => envelope.salt_bytes()?,
            None => HistoryCipher::random_salt(),
        };

        Ok(Self {
            cipher: HistoryCipher::new(secret, salt)?,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "history".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl HistoryBackend for EncryptedFileBackend {
    async fn load(&self) -> Result<HistoryDocument> {
        let Some(envelope) = read_envelope(&self.path).await? else {
            log::debug!("No history file at {}, starting empty", self.path.display());
            return Ok(HistoryDocument::default());
        };

        let plaintext = self.cipher.open(&envelope)?;
        serde_json::from_slice(&plaintext).map_err(|e| {
            FluxError::StoreUnavailable(format!("history document is corrupt: {}", e))
        })
    }

    async fn save(&self, document: &HistoryDocument) -> Result<()> {
        let plaintext = serde_json::to_vec(document)?;
        let envelope = self.cipher.seal(&plaintext)?;
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unwritable(&self.path, e))?;
        }

        // Write-then-rename keeps the previous file intact if we die mid-write.
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| unwritable(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| unwritable(&self.path, e))?;

        log::debug!(
            "Saved {} history entries to {}",
            document.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("encrypted file {}", self.path.display())
    }
}

async fn read_envelope(path: &Path) -> Result<Option<SealedEnvelope>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(FluxError::StoreUnavailable(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        FluxError::StoreUnavailable(format!(
            "{} is not a history file: {}",
            path.display(),
            e
        ))
    })
}

fn unwritable(path: &Path, e: std::io::Error) -> FluxError {
    FluxError::StoreUnavailable(format!("cannot write {}: {}", path.display(), e))
}

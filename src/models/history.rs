use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prompt: String,
    pub favorite: bool,
    pub added_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            favorite: false,
            added_at: Utc::now(),
        }
    }
}

/// Plaintext document sealed inside the encrypted history file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDocument {
    /// Oldest first.
    pub entries: Vec<HistoryEntry>,
}

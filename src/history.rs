use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ApiError;
use crate::media::DownloadSelection;

/// Durable outcome of a completed download. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub owner_identity: String,
    pub source_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(flatten)]
    pub selection: DownloadSelection,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
}

/// History persistence: in-memory snapshot plus a JSON file. Every
/// operation is scoped to the owning identity; the prospective list is
/// written to disk before the in-memory commit, so a failed write leaves
/// no partial record.
#[derive(Clone)]
pub struct HistoryStore {
    entries: Arc<Mutex<Vec<HistoryRecord>>>,
    path: PathBuf,
}

impl HistoryStore {
    pub async fn open(path: PathBuf) -> Result<Self, ApiError> {
        let entries = load_history(&path).await?;
        Ok(Self {
            entries: Arc::new(Mutex::new(entries)),
            path,
        })
    }

    pub async fn list(&self, identity: &str) -> Vec<HistoryRecord> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|record| record.owner_identity == identity)
            .cloned()
            .collect()
    }

    pub async fn append(&self, record: HistoryRecord) -> Result<(), ApiError> {
        let mut entries = self.entries.lock().await;
        let mut snapshot = entries.clone();
        snapshot.insert(0, record);
        persist_history(&self.path, &snapshot).await?;
        *entries = snapshot;
        Ok(())
    }

    /// Removes the record only if `identity` owns it; an unknown or
    /// non-owned id is a no-op. Returns the caller's updated list either
    /// way.
    pub async fn delete(&self, identity: &str, id: Uuid) -> Result<Vec<HistoryRecord>, ApiError> {
        let mut entries = self.entries.lock().await;

        let owned_position = entries
            .iter()
            .position(|record| record.id == id && record.owner_identity == identity);
        if let Some(index) = owned_position {
            let mut snapshot = entries.clone();
            snapshot.remove(index);
            persist_history(&self.path, &snapshot).await?;
            *entries = snapshot;
        }

        Ok(entries
            .iter()
            .filter(|record| record.owner_identity == identity)
            .cloned()
            .collect())
    }

    pub async fn clear_all(&self, identity: &str) -> Result<(), ApiError> {
        let mut entries = self.entries.lock().await;

        if !entries
            .iter()
            .any(|record| record.owner_identity == identity)
        {
            return Ok(());
        }

        let snapshot: Vec<HistoryRecord> = entries
            .iter()
            .filter(|record| record.owner_identity != identity)
            .cloned()
            .collect();
        persist_history(&self.path, &snapshot).await?;
        *entries = snapshot;
        Ok(())
    }
}

async fn load_history(path: &Path) -> Result<Vec<HistoryRecord>, ApiError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let mut entries: Vec<HistoryRecord> =
                serde_json::from_str(&contents).map_err(|error| {
                    ApiError::internal(format!("No se pudo leer el historial local: {error}"))
                })?;
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(entries)
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(ApiError::internal(format!(
            "No se pudo abrir el historial local: {error}"
        ))),
    }
}

async fn persist_history(path: &Path, entries: &[HistoryRecord]) -> Result<(), ApiError> {
    let payload = serde_json::to_string_pretty(entries).map_err(|error| {
        ApiError::history_unavailable(format!("No se pudo serializar el historial: {error}"))
    })?;

    tokio::fs::write(path, payload).await.map_err(|error| {
        ApiError::history_unavailable(format!("No se pudo guardar el historial: {error}"))
    })
}

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extractor::{ExtractionJob, ExtractionRequest};
use crate::history::{HistoryRecord, HistoryStore};
use crate::media::{DownloadSelection, VideoMetadata, VideoReference};

/// Coordinates one download request: identity gate, extraction call,
/// record creation. Record creation is all-or-nothing; a failure at any
/// step leaves the history untouched.
pub struct DownloadOrchestrator {
    extraction: Arc<dyn ExtractionJob>,
    history: HistoryStore,
}

impl DownloadOrchestrator {
    pub fn new(extraction: Arc<dyn ExtractionJob>, history: HistoryStore) -> Self {
        Self {
            extraction,
            history,
        }
    }

    pub async fn execute(
        &self,
        identity: Option<&str>,
        reference: &VideoReference,
        selection: DownloadSelection,
        metadata: &VideoMetadata,
    ) -> Result<HistoryRecord, ApiError> {
        let identity = identity.ok_or_else(ApiError::unauthorized)?;

        let request = ExtractionRequest {
            source_url: reference.source_url.clone(),
            selection,
            identity: identity.to_string(),
        };
        let outcome = self.extraction.run(&request).await?;

        let record = HistoryRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            owner_identity: identity.to_string(),
            source_url: reference.source_url.clone(),
            title: outcome.title.unwrap_or_else(|| metadata.title.clone()),
            thumbnail_url: Some(
                outcome
                    .thumbnail_url
                    .unwrap_or_else(|| metadata.thumbnail_url.clone()),
            ),
            selection,
            download_url: outcome.download_url,
            file_size_bytes: outcome.file_size_bytes,
        };

        self.history.append(record.clone()).await.map_err(|error| {
            ApiError::download_failed(format!(
                "La extraccion termino pero no se pudo registrar el historial: {}",
                error.message
            ))
        })?;

        info!(
            "Descarga registrada para {}: {} ({})",
            record.owner_identity,
            record.title,
            record.selection.kind_label()
        );

        Ok(record)
    }
}

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::time::{Duration, sleep};

use crate::error::ApiError;
use crate::media::{VideoMetadata, VideoReference};
use crate::validator;

pub const DEFAULT_METADATA_DELAY_MS: u64 = 1500;

/// Descriptive lookup for a validated reference. A new invocation
/// supersedes any in-flight one; stale results are discarded by the
/// caller, never cancelled here.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, reference: &VideoReference) -> Result<VideoMetadata, ApiError>;
}

/// Stands in for the real metadata API: fixed delay, values derived from
/// the content id.
pub struct SimulatedMetadataFetcher {
    delay: Duration,
}

impl SimulatedMetadataFetcher {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MetadataFetcher for SimulatedMetadataFetcher {
    async fn fetch(&self, reference: &VideoReference) -> Result<VideoMetadata, ApiError> {
        sleep(self.delay).await;

        let content_id =
            validator::extract_content_id(&reference.source_url).ok_or_else(|| {
                ApiError::metadata_unavailable(
                    "No se pudieron obtener metadatos del video. Verifica la URL e intenta nuevamente.",
                )
            })?;

        Ok(placeholder_metadata(content_id))
    }
}

pub fn placeholder_metadata(content_id: &str) -> VideoMetadata {
    VideoMetadata {
        title: format!("YouTube Video - {content_id}"),
        author: "YouTube Creator".to_string(),
        duration_display: derived_duration(content_id),
        thumbnail_url: thumbnail_url(content_id),
    }
}

pub fn thumbnail_url(content_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{content_id}/maxresdefault.jpg")
}

// Digest of the id instead of randomness, so the simulated duration is
// stable per video.
fn derived_duration(content_id: &str) -> String {
    let digest = Sha256::digest(content_id.as_bytes());
    let minutes = digest[0] % 10;
    let seconds = digest[1] % 60;
    format!("{minutes}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_deterministic_and_derived() {
        let first = placeholder_metadata("dQw4w9WgXcQ");
        let second = placeholder_metadata("dQw4w9WgXcQ");
        assert_eq!(first, second);

        assert_eq!(first.title, "YouTube Video - dQw4w9WgXcQ");
        assert_eq!(first.author, "YouTube Creator");
        assert_eq!(
            first.thumbnail_url,
            "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        );
    }

    #[test]
    fn derived_duration_is_plausible() {
        let duration = derived_duration("dQw4w9WgXcQ");
        let (minutes, seconds) = duration.split_once(':').unwrap();
        assert!(minutes.parse::<u8>().unwrap() < 10);
        assert_eq!(seconds.len(), 2);
        assert!(seconds.parse::<u8>().unwrap() < 60);
    }

    #[tokio::test]
    async fn simulated_fetch_embeds_content_id() {
        let fetcher = SimulatedMetadataFetcher::new(Duration::from_millis(0));
        let reference = VideoReference {
            source_url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            content_id: "dQw4w9WgXcQ".to_string(),
        };

        let metadata = fetcher.fetch(&reference).await.unwrap();
        assert!(metadata.thumbnail_url.contains("dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn simulated_fetch_fails_for_unrecognized_source() {
        let fetcher = SimulatedMetadataFetcher::new(Duration::from_millis(0));
        let forged = VideoReference {
            source_url: "https://example.com/dQw4w9WgXcQ".to_string(),
            content_id: "dQw4w9WgXcQ".to_string(),
        };

        let error = fetcher.fetch(&forged).await.unwrap_err();
        assert_eq!(error.code, Some("METADATA_UNAVAILABLE"));
    }
}

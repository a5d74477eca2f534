use std::io::ErrorKind;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::{
    process::Command,
    time::{Duration, sleep, timeout},
};
use tracing::warn;

use crate::error::ApiError;
use crate::media::DownloadSelection;
use crate::metadata::placeholder_metadata;
use crate::validator;

pub const DEFAULT_EXTRACTION_DELAY_MS: u64 = 2000;
pub const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 180;

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source_url: String,
    pub selection: DownloadSelection,
    pub identity: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub download_url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_display: Option<String>,
    pub file_size_bytes: Option<u64>,
}

/// The extraction step is opaque and potentially slow; implementations
/// never retry on their own.
#[async_trait]
pub trait ExtractionJob: Send + Sync {
    async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionOutcome, ApiError>;
}

/// Default mode: no real extraction, a delay plus a link and metadata
/// derived from the content id.
pub struct SimulatedExtractor {
    delay: Duration,
    public_base_url: String,
}

impl SimulatedExtractor {
    pub fn new(delay: Duration, public_base_url: impl Into<String>) -> Self {
        Self {
            delay,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ExtractionJob for SimulatedExtractor {
    async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionOutcome, ApiError> {
        let content_id = validator::extract_content_id(&request.source_url)
            .ok_or_else(ApiError::invalid_url)?;

        sleep(self.delay).await;

        let echo = placeholder_metadata(content_id);
        let download_url = format!(
            "{}/downloads/{}s/{content_id}.{}",
            self.public_base_url,
            request.selection.kind_label(),
            request.selection.file_extension()
        );

        Ok(ExtractionOutcome {
            download_url,
            title: Some(echo.title),
            thumbnail_url: Some(echo.thumbnail_url),
            duration_display: Some(echo.duration_display),
            file_size_bytes: Some(derived_file_size(content_id)),
        })
    }
}

fn derived_file_size(content_id: &str) -> u64 {
    let digest = Sha256::digest(content_id.as_bytes());
    let base = u64::from(u16::from_be_bytes([digest[2], digest[3]]));
    (base % 1000) * 1024 * 1024
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration_string: Option<String>,
    filesize_approx: Option<f64>,
}

/// Production mode: yt-dlp resolves the direct link, then a HEAD probe
/// confirms the link responds before a record is created from it.
pub struct YtDlpExtractor {
    client: reqwest::Client,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn format_selector(selection: DownloadSelection) -> String {
        match selection {
            DownloadSelection::Video { quality } => format!(
                "bestvideo[height<={0}]+bestaudio/best[height<={0}]",
                quality.height()
            ),
            DownloadSelection::Audio => "bestaudio".to_string(),
        }
    }

    async fn run_yt_dlp(&self, args: Vec<String>) -> Result<std::process::Output, ApiError> {
        let command_future = Command::new("yt-dlp").args(args).output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| {
                ApiError::download_failed(
                    "La extraccion excedio el tiempo limite. Intenta con otra URL o formato.",
                )
            })?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ApiError::internal(
                        "yt-dlp no esta instalado en el sistema. Instala yt-dlp y reinicia el backend.",
                    )
                } else {
                    ApiError::internal(format!("No se pudo ejecutar yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(ApiError::download_failed(run_error_message(&output.stderr)));
        }

        Ok(output)
    }

    async fn probe_download_url(&self, download_url: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .head(download_url)
            .send()
            .await
            .map_err(|error| {
                warn!("La URL extraida no respondio al sondeo: {error}");
                ApiError::download_failed("La URL de descarga extraida no es accesible.")
            })?;

        if !response.status().is_success() {
            return Err(ApiError::download_failed(format!(
                "La URL de descarga extraida respondio {}.",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ExtractionJob for YtDlpExtractor {
    async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionOutcome, ApiError> {
        let info_output = self
            .run_yt_dlp(vec![
                "-J".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                request.source_url.clone(),
            ])
            .await?;

        let info: YtDlpVideoInfo = serde_json::from_slice(&info_output.stdout).map_err(|error| {
            ApiError::download_failed(format!(
                "No se pudo interpretar la respuesta de yt-dlp: {error}"
            ))
        })?;

        let url_output = self
            .run_yt_dlp(vec![
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                "-f".to_string(),
                Self::format_selector(request.selection),
                "--get-url".to_string(),
                request.source_url.clone(),
            ])
            .await?;

        let download_url = String::from_utf8_lossy(&url_output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                ApiError::download_failed("yt-dlp no devolvio una URL de descarga.")
            })?;

        self.probe_download_url(&download_url).await?;

        Ok(ExtractionOutcome {
            download_url,
            title: info.title,
            thumbnail_url: info.thumbnail,
            duration_display: info.duration_string,
            file_size_bytes: info.filesize_approx.map(|value| value as u64),
        })
    }
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp no pudo completar la extraccion")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "URL no soportada o invalida para descarga.".to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Quality;

    fn request(selection: DownloadSelection) -> ExtractionRequest {
        ExtractionRequest {
            source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            selection,
            identity: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn simulated_video_link_uses_id_and_extension() {
        let extractor = SimulatedExtractor::new(
            Duration::from_millis(0),
            "http://127.0.0.1:8787/",
        );
        let outcome = extractor
            .run(&request(DownloadSelection::Video {
                quality: Quality::Q720,
            }))
            .await
            .unwrap();

        assert_eq!(
            outcome.download_url,
            "http://127.0.0.1:8787/downloads/videos/dQw4w9WgXcQ.mp4"
        );
        assert_eq!(
            outcome.title.as_deref(),
            Some("YouTube Video - dQw4w9WgXcQ")
        );
        assert!(outcome.thumbnail_url.unwrap().contains("dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn simulated_audio_link_is_mp3() {
        let extractor =
            SimulatedExtractor::new(Duration::from_millis(0), "https://descargas.example.com");
        let outcome = extractor
            .run(&request(DownloadSelection::Audio))
            .await
            .unwrap();

        assert_eq!(
            outcome.download_url,
            "https://descargas.example.com/downloads/audios/dQw4w9WgXcQ.mp3"
        );
    }

    #[tokio::test]
    async fn simulated_rejects_unrecognized_url() {
        let extractor = SimulatedExtractor::new(Duration::from_millis(0), "http://localhost");
        let mut bad = request(DownloadSelection::Audio);
        bad.source_url = "https://example.com/dQw4w9WgXcQ".to_string();

        let error = extractor.run(&bad).await.unwrap_err();
        assert_eq!(error.code, Some("INVALID_URL"));
    }

    #[test]
    fn derived_file_size_is_stable_and_bounded() {
        assert_eq!(
            derived_file_size("dQw4w9WgXcQ"),
            derived_file_size("dQw4w9WgXcQ")
        );
        assert!(derived_file_size("dQw4w9WgXcQ") < 1000 * 1024 * 1024);
    }

    #[test]
    fn format_selector_maps_quality() {
        assert_eq!(
            YtDlpExtractor::format_selector(DownloadSelection::Video {
                quality: Quality::Q480
            }),
            "bestvideo[height<=480]+bestaudio/best[height<=480]"
        );
        assert_eq!(
            YtDlpExtractor::format_selector(DownloadSelection::Audio),
            "bestaudio"
        );
    }

    #[test]
    fn run_error_message_takes_last_line() {
        let stderr = b"WARNING: algo\nERROR: no media found\n";
        assert_eq!(run_error_message(stderr), "ERROR: no media found");
        assert_eq!(
            run_error_message(b"ERROR: Unsupported URL: https://x"),
            "URL no soportada o invalida para descarga."
        );
        assert_eq!(
            run_error_message(b""),
            "yt-dlp no pudo completar la extraccion"
        );
    }
}

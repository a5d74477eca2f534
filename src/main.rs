use std::{collections::HashSet, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Semaphore, time::Duration};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use backend::{
    ApiError, DownloadOrchestrator, DownloadSelection, HistoryRecord, HistoryStore,
    IdentityPolicy, MetadataFetcher, SimulatedExtractor, SimulatedMetadataFetcher, VideoMetadata,
    YtDlpExtractor,
    extractor::{DEFAULT_EXTRACTION_DELAY_MS, DEFAULT_YT_DLP_TIMEOUT_SECONDS, ExtractionJob},
    metadata::{DEFAULT_METADATA_DELAY_MS, placeholder_metadata},
    validator,
};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<DownloadOrchestrator>,
    metadata_fetcher: Arc<dyn MetadataFetcher>,
    history: HistoryStore,
    identity_policy: IdentityPolicy,
    download_semaphore: Arc<Semaphore>,
}

const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8787";
const PROBE_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Deserialize)]
struct MetadataRequest {
    url: String,
}

#[derive(Debug, Serialize)]
struct MetadataResponse {
    content_id: String,
    title: String,
    author: String,
    duration: String,
    thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct DownloadPayload {
    url: String,
    #[serde(flatten)]
    selection: DownloadSelection,
    title: Option<String>,
    thumbnail: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "backend=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let history_path = std::env::var("HISTORY_PATH")
        .ok()
        .and_then(|value| non_empty(&value).map(PathBuf::from))
        .unwrap_or_else(|| root.join("data").join("history.json"));

    if let Some(parent) = history_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            ApiError::internal(format!("No se pudo crear la carpeta de datos: {error}"))
        })?;
    }

    let history = HistoryStore::open(history_path).await?;

    let allow_anonymous = read_bool_env("ALLOW_ANONYMOUS_DOWNLOADS").unwrap_or(false);
    if allow_anonymous {
        warn!(
            "ALLOW_ANONYMOUS_DOWNLOADS=true: las descargas sin sesion se registraran bajo la identidad compartida 'anonimo'."
        );
    }

    let max_concurrent_downloads = read_usize_env("MAX_CONCURRENT_DOWNLOADS")
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS);

    let metadata_delay = Duration::from_millis(
        read_u64_env("METADATA_DELAY_MS").unwrap_or(DEFAULT_METADATA_DELAY_MS),
    );
    let metadata_fetcher: Arc<dyn MetadataFetcher> =
        Arc::new(SimulatedMetadataFetcher::new(metadata_delay));

    let extraction = build_extraction_job()?;
    let orchestrator = Arc::new(DownloadOrchestrator::new(extraction, history.clone()));

    let state = AppState {
        orchestrator,
        metadata_fetcher,
        history,
        identity_policy: IdentityPolicy::new(allow_anonymous),
        download_semaphore: Arc::new(Semaphore::new(max_concurrent_downloads)),
    };

    let cors = build_cors_layer()?;

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/metadata", post(fetch_metadata))
        .route("/api/download", post(start_download))
        .route("/api/history", get(get_history).delete(clear_history))
        .route("/api/history/{id}", delete(delete_history_item))
        .with_state(state)
        .layer(cors);

    let addr = resolve_bind_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::internal(format!("No se pudo iniciar el puerto {addr}: {error}"))
    })?;

    info!("Backend listo en http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("Error del servidor HTTP: {error}")))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn fetch_metadata(
    State(state): State<AppState>,
    Json(payload): Json<MetadataRequest>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("Ingresa una URL antes de continuar."));
    }

    let reference = validator::validate(url).ok_or_else(ApiError::invalid_url)?;
    let metadata = state.metadata_fetcher.fetch(&reference).await?;

    Ok(Json(MetadataResponse {
        content_id: reference.content_id,
        title: metadata.title,
        author: metadata.author,
        duration: metadata.duration_display,
        thumbnail_url: metadata.thumbnail_url,
    }))
}

async fn start_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DownloadPayload>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request(
            "Ingresa una URL valida antes de descargar.",
        ));
    }
    let reference = validator::validate(url).ok_or_else(ApiError::invalid_url)?;

    let identity = state.identity_policy.resolve(&headers);

    // El cliente reenvia los metadatos que ya mostro en la vista previa;
    // cualquier campo ausente se completa con los valores derivados.
    let placeholder = placeholder_metadata(&reference.content_id);
    let metadata = VideoMetadata {
        title: payload
            .title
            .and_then(normalize_optional_text)
            .unwrap_or(placeholder.title),
        author: placeholder.author,
        duration_display: placeholder.duration_display,
        thumbnail_url: payload
            .thumbnail
            .and_then(normalize_optional_text)
            .unwrap_or(placeholder.thumbnail_url),
    };

    let _download_permit = state
        .download_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("No se pudo reservar capacidad de descarga."))?;

    let record = state
        .orchestrator
        .execute(identity.as_deref(), &reference, payload.selection, &metadata)
        .await?;

    Ok(Json(record))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<HistoryRecord>> {
    let Some(identity) = state.identity_policy.resolve(&headers) else {
        return Json(Vec::new());
    };

    Json(state.history.list(&identity).await)
}

async fn delete_history_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let Some(identity) = state.identity_policy.resolve(&headers) else {
        return Ok(Json(Vec::new()));
    };

    let updated = state.history.delete(&identity, id).await?;
    Ok(Json(updated))
}

async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(identity) = state.identity_policy.resolve(&headers) {
        state.history.clear_all(&identity).await?;
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

fn build_extraction_job() -> Result<Arc<dyn ExtractionJob>, ApiError> {
    let mode = std::env::var("EXTRACTION_MODE")
        .ok()
        .and_then(|value| non_empty(&value).map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "simulated".to_string());

    match mode.as_str() {
        "simulated" => {
            let delay = Duration::from_millis(
                read_u64_env("EXTRACTION_DELAY_MS").unwrap_or(DEFAULT_EXTRACTION_DELAY_MS),
            );
            let public_base_url = std::env::var("PUBLIC_BASE_URL")
                .ok()
                .and_then(|value| non_empty(&value).map(ToString::to_string))
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
            info!(
                "Extraccion en modo simulado (retardo {} ms).",
                delay.as_millis()
            );
            Ok(Arc::new(SimulatedExtractor::new(delay, public_base_url)))
        }
        "ytdlp" => {
            let timeout_seconds =
                read_u64_env("YT_DLP_TIMEOUT_SECONDS").unwrap_or(DEFAULT_YT_DLP_TIMEOUT_SECONDS);
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(PROBE_TIMEOUT_SECONDS))
                .build()
                .map_err(|error| {
                    ApiError::internal(format!("No se pudo crear cliente HTTP: {error}"))
                })?;
            info!("Extraccion con yt-dlp (tiempo limite {timeout_seconds} s).");
            Ok(Arc::new(YtDlpExtractor::new(
                client,
                Duration::from_secs(timeout_seconds),
            )))
        }
        other => Err(ApiError::internal(format!(
            "EXTRACTION_MODE invalido: {other}. Usa 'simulated' o 'ytdlp'."
        ))),
    }
}

fn read_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "127.0.0.1:8787".to_string()
}

fn build_cors_layer() -> Result<CorsLayer, ApiError> {
    let configured = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS no esta configurado. Se usaran origenes de desarrollo por defecto.");
        vec![
            "http://127.0.0.1:5173".to_string(),
            "http://localhost:5173".to_string(),
        ]
    } else {
        configured
    };

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Origen invalido en ALLOWED_ORIGINS: {origin}. Usa valores tipo https://dominio.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    let configured_origin_list = allowed_origins.iter().cloned().collect::<Vec<_>>();
    info!(
        "CORS allow-list cargada con {} origen(es): {:?}",
        configured_origin_list.len(),
        configured_origin_list
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let port = parsed.port();

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    let include_port = port.is_some_and(|explicit| explicit != default_port);

    if include_port {
        Some(format!("{scheme}://{host}:{}", port?))
    } else {
        Some(format!("{scheme}://{host}"))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn normalize_optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

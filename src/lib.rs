pub mod error;
pub mod extractor;
pub mod history;
pub mod identity;
pub mod media;
pub mod metadata;
pub mod orchestrator;
pub mod validator;

pub use error::ApiError;
pub use extractor::{
    ExtractionJob, ExtractionOutcome, ExtractionRequest, SimulatedExtractor, YtDlpExtractor,
};
pub use history::{HistoryRecord, HistoryStore};
pub use identity::IdentityPolicy;
pub use media::{DownloadSelection, Quality, VideoMetadata, VideoReference};
pub use metadata::{MetadataFetcher, SimulatedMetadataFetcher};
pub use orchestrator::DownloadOrchestrator;

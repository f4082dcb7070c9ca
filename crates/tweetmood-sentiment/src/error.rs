use thiserror::Error;
use tweetmood_db::StorageError;

/// Failure of a single classifier request.
///
/// These never escape [`crate::Classify::classify`]; they are logged and
/// turned into a fallback result there.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{backend} returned HTTP {status}: {message}")]
    RemoteService {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend} model unavailable (HTTP {status}): {message}")]
    ModelUnavailable {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend} returned an unrecognized response: {body}")]
    UnrecognizedResponse { backend: String, body: String },

    #[error("invalid classifier input: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("processing run cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion webhook URL is not configured")]
    NotConfigured,

    #[error("ingestion poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

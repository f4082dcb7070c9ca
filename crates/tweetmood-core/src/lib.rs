//! Shared domain types and configuration for tweetmood.

pub mod app_config;
pub mod config;
pub mod progress;
pub mod records;
pub mod sentiment;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use progress::{ProcessingProgress, Stage};
pub use records::{CleanedRecord, ProcessedRecord, ProcessingStats, RawRecord};
pub use sentiment::{Sentiment, SentimentResult, FALLBACK_CONFIDENCE, FALLBACK_LABEL_SUFFIX};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

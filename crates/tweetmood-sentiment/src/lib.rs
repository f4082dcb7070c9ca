//! Batch sentiment processing for tweetmood.
//!
//! Fetches unprocessed records, drops undated and stale ones, cleans their
//! text, classifies it through a hosted model under bounded concurrency,
//! maps results onto a five-level scale and stores them in one bulk insert.

pub mod batch;
pub mod classifier;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod mapper;
pub mod pipeline;

use tweetmood_core::AppConfig;
use tweetmood_db::{PersistenceGateway, RecordStore, TableNames};

pub use batch::{BatchCancelled, BatchConfig, BatchOrchestrator};
pub use classifier::{
    map_label, Backend, ClassifierConfig, Classify, LabelThresholds, SentimentClassifierClient,
};
pub use error::{ClassifierError, IngestError, PipelineError};
pub use filter::{clean_text, filter_recent, parse_created_at, FilterOutcome, MAX_CLEANED_CHARS};
pub use ingest::{IngestOutcome, IngestionTrigger, PollConfig};
pub use mapper::{parse_counter, to_processed_record};
pub use pipeline::{PipelineConfig, ProcessingPipeline, ProgressObserver, RunSummary};

/// Wire the production pipeline for `store` from application config.
///
/// # Errors
///
/// Returns [`ClassifierError::Network`] if the classifier HTTP client cannot
/// be built.
pub fn build_pipeline<S: RecordStore>(
    config: &AppConfig,
    store: S,
) -> Result<ProcessingPipeline<S, SentimentClassifierClient>, ClassifierError> {
    let classifier = SentimentClassifierClient::new(ClassifierConfig::from_app_config(config))?;
    Ok(ProcessingPipeline::new(
        PersistenceGateway::new(store, TableNames::from_app_config(config)),
        BatchOrchestrator::new(classifier, BatchConfig::from_app_config(config)),
        PipelineConfig::from_app_config(config),
    ))
}

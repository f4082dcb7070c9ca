//! Processing run, single-text classification and reset handlers.

use tokio_util::sync::CancellationToken;
use tweetmood_core::{AppConfig, ProcessingProgress, Stage};
use tweetmood_db::{PersistenceGateway, PgRecordStore, TableNames};
use tweetmood_sentiment::{
    filter_recent, ClassifierConfig, PipelineConfig, PipelineError, SentimentClassifierClient,
};

/// Run the pipeline once over every unprocessed record.
///
/// With `dry_run` only the first page is fetched and filtered and the counts
/// are printed. Ctrl-C cancels the run at the next chunk boundary; nothing is
/// stored in that case.
///
/// # Errors
///
/// Returns an error if the classifier client cannot be built, storage fails,
/// or the run is cancelled.
pub(crate) async fn run_process(
    config: &AppConfig,
    store: PgRecordStore,
    dry_run: bool,
    skip_warm_up: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let gateway = PersistenceGateway::new(store, TableNames::from_app_config(config));
        let pipeline_config = PipelineConfig::from_app_config(config);
        let raw = gateway
            .fetch_unprocessed(pipeline_config.fetch_limit, 0)
            .await?
            .records;
        let fetched = raw.len();
        let outcome = filter_recent(raw, pipeline_config.cutoff_year);
        println!(
            "dry-run: {fetched} unprocessed, {} eligible, {} undated, {} before {}, {} empty after cleaning",
            outcome.records.len(),
            outcome.dropped_undated,
            outcome.dropped_before_cutoff,
            pipeline_config.cutoff_year,
            outcome.dropped_empty
        );
        return Ok(());
    }

    let pipeline = tweetmood_sentiment::build_pipeline(config, store)?;
    if !skip_warm_up {
        let backend = pipeline.orchestrator().classifier().warm_up().await;
        println!("using classifier backend '{}'", backend.name);
    }

    let cancel = CancellationToken::new();
    crate::cancel_on_ctrl_c(cancel.clone());

    let observer = |progress: &ProcessingProgress| {
        if progress.stage == Stage::Error {
            eprintln!(
                "[{:>3}%] {}: {}",
                progress.percent,
                progress.message,
                progress.error.as_deref().unwrap_or("unknown error")
            );
        } else {
            println!("[{:>3}%] {}", progress.percent, progress.message);
        }
    };

    match pipeline.process_all_cancellable(&observer, &cancel).await {
        Ok(summary) => {
            println!(
                "done: {} fetched, {} eligible, {} classified ({} fallback), {} stored",
                summary.fetched,
                summary.eligible,
                summary.classified,
                summary.fallback_count,
                summary.inserted
            );
            Ok(())
        }
        Err(PipelineError::Cancelled) => anyhow::bail!("processing cancelled; nothing was stored"),
        Err(e) => Err(e.into()),
    }
}

/// Classify a single text against the configured backends.
///
/// # Errors
///
/// Returns an error if the client cannot be built or every backend fails.
pub(crate) async fn run_classify(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let client = SentimentClassifierClient::new(ClassifierConfig::from_app_config(config))?;
    let result = client.try_classify(text).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Delete all processed records. Refuses without `--yes`.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub(crate) async fn run_reset(
    gateway: &PersistenceGateway<PgRecordStore>,
    confirmed: bool,
) -> anyhow::Result<()> {
    if !confirmed {
        println!(
            "this deletes every row in '{}'; re-run with --yes to confirm",
            gateway.tables().processed
        );
        return Ok(());
    }
    let removed = gateway.reset_processed().await?;
    println!("removed {removed} processed records");
    Ok(())
}

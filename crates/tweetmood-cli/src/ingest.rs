//! Ingestion trigger handler.

use tokio_util::sync::CancellationToken;
use tweetmood_core::AppConfig;
use tweetmood_db::{PersistenceGateway, PgRecordStore, TableNames};
use tweetmood_sentiment::IngestionTrigger;

/// Trigger the ingestion webhook and poll until the configured timeout.
///
/// Ctrl-C stops polling early. The crawl's success is never confirmed; the
/// reported count is simply how much the raw table grew while polling.
/// With `then_process`, a processing run follows unless polling was
/// interrupted.
///
/// # Errors
///
/// Returns an error if no webhook URL is configured or the baseline stats
/// cannot be read.
pub(crate) async fn run_ingest(
    config: &AppConfig,
    store: PgRecordStore,
    then_process: bool,
) -> anyhow::Result<()> {
    let pool = store.pool().clone();
    let gateway = PersistenceGateway::new(store, TableNames::from_app_config(config));
    let trigger = IngestionTrigger::from_app_config(config)?;
    let poll = trigger.poll_config();
    println!(
        "ingestion triggered; polling every {}s for up to {}s",
        poll.interval.as_secs(),
        poll.timeout.as_secs()
    );

    let cancel = CancellationToken::new();
    crate::cancel_on_ctrl_c(cancel.clone());
    let outcome = trigger.trigger_and_poll(&gateway, &cancel).await?;

    println!(
        "{} new records after {} polls (total {}, remaining {}){}",
        outcome.new_records,
        outcome.polls,
        outcome.last.total,
        outcome.last.remaining,
        if outcome.cancelled { ", stopped early" } else { "" }
    );

    if then_process && !outcome.cancelled {
        crate::process::run_process(config, PgRecordStore::new(pool), false, false).await?;
    }
    Ok(())
}

//! Read-only query handlers.

use tweetmood_db::{PersistenceGateway, PgRecordStore};

/// Show total, processed and remaining record counts.
///
/// # Errors
///
/// Returns an error if either count fails.
pub(crate) async fn run_stats(gateway: &PersistenceGateway<PgRecordStore>) -> anyhow::Result<()> {
    let stats = gateway.fetch_stats().await?;
    println!("{:<12}{:<12}REMAINING", "TOTAL", "PROCESSED");
    println!("{:<12}{:<12}{}", stats.total, stats.processed, stats.remaining);
    if stats.remaining < 0 {
        println!("warning: more processed rows than raw rows");
    }
    Ok(())
}

/// List up to `limit` processed records.
///
/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn run_records(
    gateway: &PersistenceGateway<PgRecordStore>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let records = gateway.fetch_processed(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("no processed records found; run `tweetmood process` first");
        return Ok(());
    }

    println!(
        "{:<22}{:<18}{:<15}{:<8}TEXT",
        "TWEET", "DATE", "SENTIMENT", "CONF"
    );
    for record in &records {
        let text: String = record.cleaned_text.chars().take(60).collect();
        println!(
            "{:<22}{:<18}{:<15}{:<8.2}{}",
            record.tweet_id,
            record.tweet_date.format("%Y-%m-%d %H:%M"),
            record.result.sentiment.as_str(),
            record.result.confidence,
            text
        );
    }
    Ok(())
}

//! Record-level persistence on top of a [`RecordStore`].

use serde::Serialize;
use tweetmood_core::{ProcessedRecord, ProcessingStats, RawRecord};

use crate::store::{OrderBy, QueryFilter, RecordStore};
use crate::StorageError;

/// Column in the raw table holding the upstream record id.
pub const RAW_ID_COLUMN: &str = "id";
/// Column in the processed table referencing the raw record id.
pub const PROCESSED_REF_COLUMN: &str = "tweet_id";
/// Column in the processed table holding the processing timestamp.
pub const PROCESSED_AT_COLUMN: &str = "processed_at";

/// Configured names of the raw and processed tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub raw: String,
    pub processed: String,
}

impl TableNames {
    #[must_use]
    pub fn from_app_config(config: &tweetmood_core::AppConfig) -> Self {
        Self {
            raw: config.raw_table.clone(),
            processed: config.processed_table.clone(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            raw: "tweets".to_string(),
            processed: "processed_tweets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted_count: u64,
}

/// One page of the unprocessed backlog.
#[derive(Debug, Clone, PartialEq)]
pub struct UnprocessedPage {
    pub records: Vec<RawRecord>,
    /// Rows returned by the store, including any that failed to decode.
    pub row_count: usize,
}

pub struct PersistenceGateway<S> {
    store: S,
    tables: TableNames,
}

impl<S: RecordStore> PersistenceGateway<S> {
    pub fn new(store: S, tables: TableNames) -> Self {
        Self { store, tables }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Fetch one page of raw records that have no processed counterpart,
    /// ordered by id so consecutive offsets walk the whole backlog.
    ///
    /// Returns the number of rows the store produced alongside the decoded
    /// records; rows that do not deserialize as [`RawRecord`] are skipped
    /// with a warning but still count, so a short page means the backlog is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying query fails.
    pub async fn fetch_unprocessed(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<UnprocessedPage, StorageError> {
        let filter = QueryFilter::not_in(
            RAW_ID_COLUMN,
            &self.tables.processed,
            PROCESSED_REF_COLUMN,
        );
        let rows = self
            .store
            .query(
                &self.tables.raw,
                &filter,
                Some(&OrderBy::asc(RAW_ID_COLUMN)),
                limit,
                offset,
            )
            .await?;
        let row_count = rows.len();
        Ok(UnprocessedPage {
            records: decode_rows(&self.tables.raw, rows),
            row_count,
        })
    }

    /// Fetch up to `limit` processed records, most recently processed first.
    /// Backs `getProcessedRecords(limit)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying query fails.
    pub async fn fetch_processed(
        &self,
        limit: usize,
    ) -> Result<Vec<ProcessedRecord>, StorageError> {
        let rows = self
            .store
            .query(
                &self.tables.processed,
                &QueryFilter::All,
                Some(&OrderBy::desc(PROCESSED_AT_COLUMN)),
                limit,
                0,
            )
            .await?;
        Ok(decode_rows(&self.tables.processed, rows))
    }

    /// Insert every record in a single bulk call.
    ///
    /// An empty slice returns `inserted_count = 0` without touching the store.
    /// A failed bulk insert is reported as one error; nothing is counted as
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if a record cannot be encoded,
    /// or whatever the store's bulk insert returns.
    pub async fn insert_all(
        &self,
        records: &[ProcessedRecord],
    ) -> Result<InsertSummary, StorageError> {
        if records.is_empty() {
            return Ok(InsertSummary { inserted_count: 0 });
        }

        let rows = records
            .iter()
            .map(|record| {
                serde_json::to_value(record).map_err(|e| StorageError::Serialization {
                    context: format!("processed record {}", record.tweet_id),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inserted_count = self
            .store
            .insert_many(&self.tables.processed, &rows)
            .await?;
        tracing::info!(
            table = %self.tables.processed,
            inserted_count,
            "processed records stored"
        );
        Ok(InsertSummary { inserted_count })
    }

    /// Count raw and processed rows concurrently. Backs `getProcessingStats()`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if either count fails.
    pub async fn fetch_stats(&self) -> Result<ProcessingStats, StorageError> {
        let (total, processed) = tokio::try_join!(
            self.store.count(&self.tables.raw, &QueryFilter::All),
            self.store.count(&self.tables.processed, &QueryFilter::All),
        )?;

        let stats = ProcessingStats::from_counts(to_i64(total), to_i64(processed));
        if stats.remaining < 0 {
            tracing::warn!(
                total = stats.total,
                processed = stats.processed,
                "more processed rows than raw rows; upstream data is inconsistent"
            );
        }
        Ok(stats)
    }

    /// Delete every processed record so the raw set can be reprocessed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the delete fails.
    pub async fn reset_processed(&self) -> Result<u64, StorageError> {
        let removed = self
            .store
            .delete_many(&self.tables.processed, &QueryFilter::All)
            .await?;
        tracing::warn!(table = %self.tables.processed, removed, "processed records cleared");
        Ok(removed)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn decode_rows<T: serde::de::DeserializeOwned>(
    table: &str,
    rows: Vec<serde_json::Value>,
) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping row that failed to decode");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tweetmood_core::{Sentiment, SentimentResult};

    use super::*;
    use crate::MemoryStore;

    fn processed(tweet_id: i64) -> ProcessedRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        ProcessedRecord {
            tweet_id,
            text: "great day".to_string(),
            cleaned_text: "great day".to_string(),
            result: SentimentResult::from_score(Sentiment::Positive, "positive", 0.7),
            like_count: 0,
            retweet_count: 0,
            reply_count: 0,
            view_count: 0,
            tweet_date: at,
            processed_at: at,
        }
    }

    async fn gateway_with_raw(
        ids: &[i64],
    ) -> (Arc<MemoryStore>, PersistenceGateway<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let rows = ids
            .iter()
            .map(|id| json!({"id": id, "text": format!("tweet {id}")}))
            .collect();
        store.seed("tweets", rows).await;
        let gateway = PersistenceGateway::new(Arc::clone(&store), TableNames::default());
        (store, gateway)
    }

    #[tokio::test]
    async fn fetch_unprocessed_skips_already_processed_ids() {
        let (_store, gateway) = gateway_with_raw(&[1, 2, 3]).await;
        gateway.insert_all(&[processed(2)]).await.unwrap();

        let pending = gateway.fetch_unprocessed(100, 0).await.unwrap();
        let ids: Vec<i64> = pending.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn fetch_unprocessed_skips_malformed_rows() {
        let (store, gateway) = gateway_with_raw(&[1]).await;
        store
            .seed(
                "tweets",
                vec![json!({"id": 1, "text": "ok"}), json!({"text": "no id"})],
            )
            .await;
        let pending = gateway.fetch_unprocessed(100, 0).await.unwrap();
        assert_eq!(pending.records.len(), 1);
        assert_eq!(pending.row_count, 2);
    }

    #[tokio::test]
    async fn fetch_unprocessed_pages_in_id_order() {
        let (_store, gateway) = gateway_with_raw(&[5, 1, 4, 2, 3]).await;
        gateway.insert_all(&[processed(2)]).await.unwrap();

        let first = gateway.fetch_unprocessed(2, 0).await.unwrap();
        let second = gateway.fetch_unprocessed(2, 2).await.unwrap();
        let ids = |page: &UnprocessedPage| page.records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), vec![1, 3]);
        assert_eq!(ids(&second), vec![4, 5]);
        assert_eq!(gateway.fetch_unprocessed(2, 4).await.unwrap().row_count, 0);
    }

    #[tokio::test]
    async fn fetch_processed_returns_most_recent_first() {
        let (_store, gateway) = gateway_with_raw(&[1, 2, 3]).await;
        let mut older = processed(1);
        older.processed_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newest = processed(3);
        newest.processed_at = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        gateway
            .insert_all(&[older, processed(2), newest])
            .await
            .unwrap();

        let back = gateway.fetch_processed(2).await.unwrap();
        let ids: Vec<i64> = back.iter().map(|r| r.tweet_id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn insert_all_with_empty_slice_does_not_touch_store() {
        let (store, gateway) = gateway_with_raw(&[]).await;
        store.set_reject_inserts(true);
        let summary = gateway.insert_all(&[]).await.unwrap();
        assert_eq!(summary.inserted_count, 0);
    }

    #[tokio::test]
    async fn insert_all_failure_is_one_error_and_commits_nothing() {
        let (store, gateway) = gateway_with_raw(&[1, 2]).await;
        store.set_reject_inserts(true);
        let result = gateway.insert_all(&[processed(1), processed(2)]).await;
        assert!(result.is_err());
        assert!(store.rows("processed_tweets").await.is_empty());
    }

    #[tokio::test]
    async fn stats_report_total_processed_and_remaining() {
        let (_store, gateway) = gateway_with_raw(&[1, 2, 3, 4]).await;
        gateway.insert_all(&[processed(1)]).await.unwrap();
        let stats = gateway.fetch_stats().await.unwrap();
        assert_eq!(stats, ProcessingStats::from_counts(4, 1));
        assert_eq!(stats.remaining, 3);
    }

    #[tokio::test]
    async fn stats_do_not_clamp_inconsistent_counts() {
        let (_store, gateway) = gateway_with_raw(&[1]).await;
        gateway
            .insert_all(&[processed(1), processed(9)])
            .await
            .unwrap();
        let stats = gateway.fetch_stats().await.unwrap();
        assert_eq!(stats.remaining, -1);
    }

    #[tokio::test]
    async fn processed_records_read_back_intact() {
        let (_store, gateway) = gateway_with_raw(&[5]).await;
        let record = processed(5);
        gateway.insert_all(std::slice::from_ref(&record)).await.unwrap();
        let back = gateway.fetch_processed(10).await.unwrap();
        assert_eq!(back, vec![record]);
    }

    #[tokio::test]
    async fn reset_processed_makes_everything_pending_again() {
        let (_store, gateway) = gateway_with_raw(&[1, 2]).await;
        gateway
            .insert_all(&[processed(1), processed(2)])
            .await
            .unwrap();
        assert_eq!(gateway.reset_processed().await.unwrap(), 2);
        assert_eq!(gateway.fetch_unprocessed(10, 0).await.unwrap().records.len(), 2);
    }
}

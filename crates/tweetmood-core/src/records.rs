//! Record shapes that flow through the processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::sentiment::SentimentResult;

/// One un-analyzed social post, as written by the ingestion workflow.
///
/// Read-only to the pipeline. Engagement counters arrive as free-form
/// strings (`"1,204"`) or plain JSON numbers depending on the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "created_at")]
    pub created_at_text: Option<String>,
    #[serde(default, rename = "like_count", deserialize_with = "lenient_counter")]
    pub likes: Option<String>,
    #[serde(default, rename = "retweet_count", deserialize_with = "lenient_counter")]
    pub reposts: Option<String>,
    #[serde(default, rename = "reply_count", deserialize_with = "lenient_counter")]
    pub replies: Option<String>,
    #[serde(default, rename = "view_count", deserialize_with = "lenient_counter")]
    pub views: Option<String>,
}

impl RawRecord {
    /// A record with only an id and text, everything else missing.
    #[must_use]
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: Some(text.into()),
            created_at_text: None,
            likes: None,
            reposts: None,
            replies: None,
            views: None,
        }
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at_text = Some(created_at.into());
        self
    }
}

/// Accept a counter as a JSON string, number, or null.
fn lenient_counter<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A raw record that passed the date filter and cleaned to non-empty text.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub raw: RawRecord,
    /// Never empty.
    pub cleaned_text: String,
    pub parsed_date: Option<DateTime<Utc>>,
}

/// A classified record ready for (or read back from) durable storage.
///
/// Append-only: created once per cleaned record, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub tweet_id: i64,
    pub text: String,
    pub cleaned_text: String,
    #[serde(flatten)]
    pub result: SentimentResult,
    pub like_count: i64,
    pub retweet_count: i64,
    pub reply_count: i64,
    pub view_count: i64,
    pub tweet_date: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

/// Row counts backing `getProcessingStats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total: i64,
    pub processed: i64,
    /// `total - processed`. Negative only if processed rows exist without a
    /// raw counterpart, which points at an upstream bug.
    pub remaining: i64,
}

impl ProcessingStats {
    #[must_use]
    pub fn from_counts(total: i64, processed: i64) -> Self {
        Self {
            total,
            processed,
            remaining: total - processed,
        }
    }
}

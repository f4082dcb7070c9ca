//! Combining a cleaned record with its classification.

use chrono::{DateTime, Utc};
use tweetmood_core::{CleanedRecord, ProcessedRecord, SentimentResult};

/// Parse a scraped engagement counter, keeping only its digits.
///
/// `"1,234"` becomes 1234. Missing, empty or unparseable values are 0.
#[must_use]
pub fn parse_counter(raw: Option<&str>) -> i64 {
    raw.map(|s| s.chars().filter(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Build the persisted form of a classified record.
///
/// A record without a parsed date is stamped with `processed_at`.
#[must_use]
pub fn to_processed_record(
    cleaned: &CleanedRecord,
    result: SentimentResult,
    processed_at: DateTime<Utc>,
) -> ProcessedRecord {
    let raw = &cleaned.raw;
    ProcessedRecord {
        tweet_id: raw.id,
        text: raw.text.clone().unwrap_or_default(),
        cleaned_text: cleaned.cleaned_text.clone(),
        result,
        like_count: parse_counter(raw.likes.as_deref()),
        retweet_count: parse_counter(raw.reposts.as_deref()),
        reply_count: parse_counter(raw.replies.as_deref()),
        view_count: parse_counter(raw.views.as_deref()),
        tweet_date: cleaned.parsed_date.unwrap_or(processed_at),
        processed_at,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tweetmood_core::{RawRecord, Sentiment};

    use super::*;

    #[test]
    fn counters_keep_only_digits() {
        assert_eq!(parse_counter(Some("1,234")), 1234);
        assert_eq!(parse_counter(Some(" 56 likes")), 56);
        assert_eq!(parse_counter(Some("")), 0);
        assert_eq!(parse_counter(Some("n/a")), 0);
        assert_eq!(parse_counter(None), 0);
    }

    #[test]
    fn counter_overflow_is_zero() {
        assert_eq!(parse_counter(Some("99999999999999999999999")), 0);
    }

    #[test]
    fn record_carries_ids_text_counts_and_result() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let raw = RawRecord {
            likes: Some("1,234".to_owned()),
            reposts: Some("7".to_owned()),
            replies: None,
            views: Some("12K".to_owned()),
            ..RawRecord::new(42, "Great #launch!!")
        };
        let cleaned = CleanedRecord {
            raw,
            cleaned_text: "Great launch.".to_owned(),
            parsed_date: Some(date),
        };
        let result = SentimentResult::from_score(Sentiment::VeryPositive, "LABEL_2", 0.91);

        let record = to_processed_record(&cleaned, result.clone(), now);
        assert_eq!(record.tweet_id, 42);
        assert_eq!(record.text, "Great #launch!!");
        assert_eq!(record.cleaned_text, "Great launch.");
        assert_eq!(record.like_count, 1234);
        assert_eq!(record.retweet_count, 7);
        assert_eq!(record.reply_count, 0);
        assert_eq!(record.view_count, 12);
        assert_eq!(record.tweet_date, date);
        assert_eq!(record.processed_at, now);
        assert_eq!(record.result, result);
    }

    #[test]
    fn missing_date_uses_processing_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let cleaned = CleanedRecord {
            raw: RawRecord::new(1, "hi"),
            cleaned_text: "hi".to_owned(),
            parsed_date: None,
        };
        let record = to_processed_record(&cleaned, SentimentResult::fallback("m"), now);
        assert_eq!(record.tweet_date, now);
    }
}

//! Record eligibility and text cleaning.
//!
//! Pure and synchronous: no network or storage access happens here.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use tweetmood_core::{CleanedRecord, RawRecord};

/// Cleaned text is capped at this many characters to respect classifier input limits.
pub const MAX_CLEANED_CHARS: usize = 500;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]+>").expect("valid regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("valid regex"));
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").expect("valid regex"));
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#+(\w)").expect("valid regex"));
static TERMINAL_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]{2,}").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static HUMAN_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})\s+at\s+(\d{1,2}):(\d{2})\s*([ap])\.?m\.?$",
    )
    .expect("valid regex")
});

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Cleaned records plus counts of what was dropped and why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub records: Vec<CleanedRecord>,
    /// Missing or unparseable `created_at`.
    pub dropped_undated: usize,
    /// Dated before January 1 of the cutoff year.
    pub dropped_before_cutoff: usize,
    /// Text missing or empty after cleaning.
    pub dropped_empty: usize,
}

impl FilterOutcome {
    #[must_use]
    pub fn dropped_total(&self) -> usize {
        self.dropped_undated + self.dropped_before_cutoff + self.dropped_empty
    }

    /// Fold another page's outcome into this one.
    pub fn absorb(&mut self, other: FilterOutcome) {
        self.records.extend(other.records);
        self.dropped_undated += other.dropped_undated;
        self.dropped_before_cutoff += other.dropped_before_cutoff;
        self.dropped_empty += other.dropped_empty;
    }
}

/// Keep records dated in `cutoff_year` or later whose text survives cleaning.
///
/// Undated records are dropped without error; the count is reported in the
/// outcome so callers can surface it.
#[must_use]
pub fn filter_recent(records: Vec<RawRecord>, cutoff_year: i32) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for raw in records {
        let Some(parsed) = raw.created_at_text.as_deref().and_then(parse_created_at) else {
            tracing::debug!(
                record_id = raw.id,
                created_at = raw.created_at_text.as_deref().unwrap_or(""),
                "dropping record with missing or unparseable date"
            );
            outcome.dropped_undated += 1;
            continue;
        };

        if parsed.year() < cutoff_year {
            outcome.dropped_before_cutoff += 1;
            continue;
        }

        let cleaned_text = clean_text(raw.text.as_deref().unwrap_or(""));
        if cleaned_text.is_empty() {
            tracing::debug!(record_id = raw.id, "dropping record with empty cleaned text");
            outcome.dropped_empty += 1;
            continue;
        }

        outcome.records.push(CleanedRecord {
            raw,
            cleaned_text,
            parsed_date: Some(parsed),
        });
    }

    outcome
}

/// Normalize free text for classification.
///
/// Strips markup, URLs and @-mentions, unwraps hashtags to their word,
/// collapses runs of terminal punctuation to a single period, collapses
/// whitespace, trims, and truncates to [`MAX_CLEANED_CHARS`] characters.
/// The result is a fixpoint: cleaning it again returns it unchanged.
#[must_use]
pub fn clean_text(input: &str) -> String {
    let mut current = clean_pass(input);
    // A changing pass either shortens the text or only rewrites whitespace
    // to single spaces, so this reaches a fixpoint.
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(input: &str) -> String {
    let text = HTML_TAG_RE.replace_all(input, " ");
    let text = decode_entities(&text);
    let text = URL_RE.replace_all(&text, "");
    let text = MENTION_RE.replace_all(&text, "");
    let text = HASHTAG_RE.replace_all(&text, "$1");
    let text = TERMINAL_PUNCT_RE.replace_all(&text, ".");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    truncate_chars(text.trim(), MAX_CLEANED_CHARS)
        .trim_end()
        .to_string()
}

fn decode_entities(input: &str) -> String {
    HTML_ENTITIES
        .iter()
        .fold(input.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}

/// Borrow at most `max` characters of `s`, never splitting a character.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse a free-form creation date.
///
/// Tries the scraper's `"October 29, 2015 at 05:59 AM"` shape first, then a
/// list of common machine formats. Offset-less values are taken as UTC.
#[must_use]
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_human_date(trimmed).or_else(|| parse_generic_date(trimmed))
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .find(|(full, _)| *full == name || (name.len() <= 4 && full.starts_with(&name)))
        .map(|(_, n)| *n)
}

fn parse_human_date(s: &str) -> Option<DateTime<Utc>> {
    let caps = HUMAN_DATE_RE.captures(s)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let hour12: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    let is_pm = caps[6].eq_ignore_ascii_case("p");

    if !(1..=12).contains(&hour12) {
        return None;
    }
    let hour = match (hour12, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, 0)
        .map(|dt| dt.and_utc())
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

fn parse_generic_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Twitter API v1.1 style: "Wed Oct 10 20:19:24 +0000 2018".
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    fn dated(id: i64, text: &str, created_at: &str) -> RawRecord {
        RawRecord::new(id, text).with_created_at(created_at)
    }

    #[test]
    fn human_date_converts_twelve_hour_clock() {
        let morning = parse_created_at("October 29, 2015 at 05:59 AM").unwrap();
        assert_eq!(morning, Utc.with_ymd_and_hms(2015, 10, 29, 5, 59, 0).unwrap());

        let evening = parse_created_at("March 3, 2024 at 07:15 PM").unwrap();
        assert_eq!(evening.hour(), 19);
    }

    #[test]
    fn midnight_and_noon_edge_cases() {
        let midnight = parse_created_at("January 1, 2024 at 12:00 AM").unwrap();
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let noon = parse_created_at("January 1, 2024 at 12:00 PM").unwrap();
        assert_eq!(noon.hour(), 12);
    }

    #[test]
    fn human_date_accepts_abbreviated_months_and_case() {
        let dt = parse_created_at("sept 9, 2024 at 1:05 pm").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 9, 9, 13, 5, 0).unwrap());
        assert!(parse_created_at("Dec 31, 2023 at 11:59 PM").is_some());
    }

    #[test]
    fn human_date_rejects_impossible_values() {
        assert!(parse_created_at("February 30, 2024 at 10:00 AM").is_none());
        assert!(parse_created_at("Smarch 3, 2024 at 10:00 AM").is_none());
        assert!(parse_created_at("March 3, 2024 at 13:00 PM").is_none());
    }

    #[test]
    fn generic_formats_are_accepted() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_created_at("2024-06-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_created_at("2024-06-01 09:30:00"), Some(expected));
        assert_eq!(
            parse_created_at("Sat Jun 01 09:30:00 +0000 2024"),
            Some(expected)
        );
        assert_eq!(
            parse_created_at("2024-06-01"),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn unparseable_dates_yield_none() {
        assert!(parse_created_at("").is_none());
        assert!(parse_created_at("yesterday-ish").is_none());
    }

    #[test]
    fn cutoff_boundary_is_inclusive_of_new_year_midnight() {
        let outcome = filter_recent(
            vec![
                dated(1, "first of the year", "January 1, 2024 at 12:00 AM"),
                dated(2, "last of the old year", "December 31, 2023 at 11:59 PM"),
            ],
            2024,
        );
        let ids: Vec<i64> = outcome.records.iter().map(|r| r.raw.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(outcome.dropped_before_cutoff, 1);
    }

    #[test]
    fn old_records_are_excluded() {
        let outcome = filter_recent(
            vec![dated(1, "throwback", "October 29, 2015 at 05:59 AM")],
            2024,
        );
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.dropped_before_cutoff, 1);
    }

    #[test]
    fn undated_and_empty_records_are_counted_not_errored() {
        let outcome = filter_recent(
            vec![
                RawRecord::new(1, "no date at all"),
                dated(2, "garbage date", "sometime"),
                dated(3, "https://only.a/link @who", "2024-02-02"),
                RawRecord {
                    text: None,
                    ..dated(4, "", "2024-02-02")
                },
                dated(5, "keep me", "2024-02-02"),
            ],
            2024,
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].raw.id, 5);
        assert_eq!(outcome.dropped_undated, 2);
        assert_eq!(outcome.dropped_empty, 2);
        assert_eq!(outcome.dropped_total(), 4);
    }

    #[test]
    fn cleaned_records_carry_parsed_date() {
        let outcome = filter_recent(vec![dated(9, "hello", "2024-02-02")], 2024);
        assert_eq!(
            outcome.records[0].parsed_date,
            Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn clean_text_strips_url_mention_and_collapses_punctuation() {
        let cleaned = clean_text("Check https://x.co/abc @someone !!!");
        assert_eq!(cleaned, "Check .");
        assert!(!cleaned.contains("http"));
        assert!(!cleaned.contains('@'));
        assert!(!cleaned.contains("!!!"));
    }

    #[test]
    fn clean_text_keeps_hashtag_words() {
        assert_eq!(clean_text("Loving #RustLang and ##tokio"), "Loving RustLang and tokio");
    }

    #[test]
    fn clean_text_collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  so \t\n  many   spaces  "), "so many spaces");
    }

    #[test]
    fn clean_text_strips_markup_and_entities() {
        assert_eq!(
            clean_text("<b>bold</b> &amp; <i>brave</i>"),
            "bold & brave"
        );
    }

    #[test]
    fn clean_text_truncates_to_limit() {
        let long = "é".repeat(MAX_CLEANED_CHARS + 50);
        let cleaned = clean_text(&long);
        assert_eq!(cleaned.chars().count(), MAX_CLEANED_CHARS);
    }

    #[test]
    fn clean_text_is_idempotent() {
        let long_words = "word ".repeat(200);
        let inputs = [
            "",
            "   ",
            "Check https://x.co/abc @someone !!!",
            "http@x://evil.example now",
            "##double #tag",
            "wow!!! really?? yes... ok.",
            "&amp;lt;b&amp;gt;nested&amp;lt;/b&amp;gt;",
            "a . . . b",
            "emoji 🎉🎉 #party @pal www.site.com/x",
            long_words.as_str(),
            "trailing space at cut ",
        ];
        for input in inputs {
            let once = clean_text(input);
            let twice = clean_text(&once);
            assert_eq!(once, twice, "cleaning was not idempotent for {input:?}");
        }
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}

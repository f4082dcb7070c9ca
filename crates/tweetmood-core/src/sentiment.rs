//! The canonical five-level sentiment scale and classification results.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Suffix carried by every fallback label, e.g. `TWITTER_ROBERTA_NEU_FALLBACK`.
pub const FALLBACK_LABEL_SUFFIX: &str = "_NEU_FALLBACK";

/// Confidence and score assigned to fallback results.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Closed sentiment enumeration shared by every classifier backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl Sentiment {
    pub const ALL: [Sentiment; 5] = [
        Sentiment::VeryNegative,
        Sentiment::Negative,
        Sentiment::Neutral,
        Sentiment::Positive,
        Sentiment::VeryPositive,
    ];

    /// Integer value on the `-2..=2` scale.
    #[must_use]
    pub fn value(self) -> i8 {
        match self {
            Sentiment::VeryNegative => -2,
            Sentiment::Negative => -1,
            Sentiment::Neutral => 0,
            Sentiment::Positive => 1,
            Sentiment::VeryPositive => 2,
        }
    }

    /// Inverse of [`Sentiment::value`]. Returns `None` outside `-2..=2`.
    #[must_use]
    pub fn from_value(value: i8) -> Option<Self> {
        match value {
            -2 => Some(Sentiment::VeryNegative),
            -1 => Some(Sentiment::Negative),
            0 => Some(Sentiment::Neutral),
            1 => Some(Sentiment::Positive),
            2 => Some(Sentiment::VeryPositive),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::VeryNegative => "very_negative",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
            Sentiment::VeryPositive => "very_positive",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sentiment::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown sentiment '{s}'"))
    }
}

/// Output of classifying one text.
///
/// `sentiment_value` is not stored: it is derived from `sentiment` whenever
/// the result is serialized, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    /// Backend score rounded to two decimals, in `[0, 1]`.
    pub confidence: f64,
    /// Backend-specific label, kept for audit only.
    pub label: String,
    /// Unrounded backend score, in `[0, 1]`.
    pub score: f64,
}

impl SentimentResult {
    /// Build a result from a backend score, rounding `confidence` to two decimals.
    ///
    /// Scores outside `[0, 1]` (or NaN) are clamped first.
    #[must_use]
    pub fn from_score(sentiment: Sentiment, label: impl Into<String>, score: f64) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            sentiment,
            confidence: (score * 100.0).round() / 100.0,
            label: label.into(),
            score,
        }
    }

    /// The neutral result substituted when classification cannot complete.
    ///
    /// `backend` is upper-cased and non-alphanumerics become `_`, so
    /// `"twitter-roberta"` yields the label `TWITTER_ROBERTA_NEU_FALLBACK`.
    #[must_use]
    pub fn fallback(backend: &str) -> Self {
        let tag: String = backend
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Self {
            sentiment: Sentiment::Neutral,
            confidence: FALLBACK_CONFIDENCE,
            label: format!("{tag}{FALLBACK_LABEL_SUFFIX}"),
            score: FALLBACK_CONFIDENCE,
        }
    }

    #[must_use]
    pub fn sentiment_value(&self) -> i8 {
        self.sentiment.value()
    }

    /// `true` when this result is a substituted fallback rather than a real classification.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.label.ends_with("_FALLBACK")
    }
}

impl Serialize for SentimentResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SentimentResult", 5)?;
        state.serialize_field("sentiment", &self.sentiment)?;
        state.serialize_field("sentiment_value", &self.sentiment.value())?;
        state.serialize_field("confidence", &self.confidence)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("score", &self.score)?;
        state.end()
    }
}

//! Mapping raw model labels onto the five-level sentiment scale.

use tweetmood_core::{Sentiment, SentimentResult};

/// Score thresholds applied when mapping a label to a [`Sentiment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelThresholds {
    /// Negative or positive labels at or above this score become "very".
    pub strong: f64,
    /// Neutral labels strictly above this score are promoted to positive.
    pub neutral_promotion: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            strong: 0.8,
            neutral_promotion: 0.72,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LabelFamily {
    Negative,
    Neutral,
    Positive,
}

/// Recognize the polarity family of a model label.
///
/// Handles `LABEL_0/1/2` codes, `neg`/`neu`/`pos` style words, and
/// `"N stars"` ratings.
pub(crate) fn label_family(label: &str) -> Option<LabelFamily> {
    let label = label.trim().to_ascii_lowercase();

    match label.as_str() {
        "label_0" => return Some(LabelFamily::Negative),
        "label_1" => return Some(LabelFamily::Neutral),
        "label_2" => return Some(LabelFamily::Positive),
        _ => {}
    }

    if let Some(stars) = star_rating(&label) {
        return match stars {
            1 | 2 => Some(LabelFamily::Negative),
            3 => Some(LabelFamily::Neutral),
            4 | 5 => Some(LabelFamily::Positive),
            _ => None,
        };
    }

    if label.contains("neg") {
        Some(LabelFamily::Negative)
    } else if label.contains("pos") {
        Some(LabelFamily::Positive)
    } else if label.contains("neu") {
        Some(LabelFamily::Neutral)
    } else {
        None
    }
}

fn star_rating(label: &str) -> Option<u8> {
    let count = label
        .strip_suffix("stars")
        .or_else(|| label.strip_suffix("star"))?;
    count.trim().parse().ok()
}

/// Turn a `(label, score)` prediction into a [`SentimentResult`].
///
/// Unrecognized labels map to neutral and keep the original label text.
#[must_use]
pub fn map_label(label: &str, score: f64, thresholds: &LabelThresholds) -> SentimentResult {
    let family = label_family(label);
    if family.is_none() {
        tracing::debug!(label, "unrecognized classifier label, mapping to neutral");
    }

    let sentiment = match family {
        Some(LabelFamily::Negative) if score >= thresholds.strong => Sentiment::VeryNegative,
        Some(LabelFamily::Negative) => Sentiment::Negative,
        Some(LabelFamily::Positive) if score >= thresholds.strong => Sentiment::VeryPositive,
        Some(LabelFamily::Positive) => Sentiment::Positive,
        Some(LabelFamily::Neutral) if score > thresholds.neutral_promotion => Sentiment::Positive,
        Some(LabelFamily::Neutral) | None => Sentiment::Neutral,
    };

    SentimentResult::from_score(sentiment, label, score)
}

//! Progress notifications emitted by a pipeline run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Fetching,
    Filtering,
    Analyzing,
    Storing,
    Completed,
    Error,
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }
}

/// Transient progress value delivered to an observer after each stage
/// transition. Advisory only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub stage: Stage,
    /// `0..=100`.
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingProgress {
    #[must_use]
    pub fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
            error: None,
        }
    }

    /// Terminal `error` progress carrying the underlying message.
    #[must_use]
    pub fn failed(percent: u8, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage: Stage::Error,
            percent: percent.min(100),
            message: message.into(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_and_error_are_terminal() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Error.is_terminal());
        assert!(!Stage::Analyzing.is_terminal());
        assert!(!Stage::Idle.is_terminal());
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(ProcessingProgress::new(Stage::Storing, 250, "x").percent, 100);
    }

    #[test]
    fn serializes_stage_in_snake_case_and_omits_empty_error() {
        let json = serde_json::to_value(ProcessingProgress::new(Stage::Fetching, 10, "go")).unwrap();
        assert_eq!(json["stage"], "fetching");
        assert!(json.get("error").is_none());
    }
}

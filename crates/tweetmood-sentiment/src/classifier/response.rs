//! Decoding classifier response bodies.
//!
//! Hosted inference endpoints answer in several shapes depending on the
//! model and the provider: a single prediction object, a flat list of
//! predictions, a list wrapping one list per input, or an error envelope.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ClassifierError;

/// Longest response excerpt carried in an error.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct Prediction {
    #[serde(alias = "intent")]
    pub label: String,
    #[serde(alias = "confidence")]
    pub score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseShape {
    Single(Prediction),
    List(Vec<Prediction>),
    Nested(Vec<Vec<Prediction>>),
    Error { error: Value },
}

/// Pick the highest-scoring prediction out of a successful response body.
///
/// Ties go to the first candidate. An `{"error": ...}` envelope is reported
/// the same way a non-2xx status would be.
pub(crate) fn best_prediction(backend: &str, body: &str) -> Result<Prediction, ClassifierError> {
    let shape: ResponseShape =
        serde_json::from_str(body).map_err(|_| unrecognized(backend, body))?;

    let candidates = match shape {
        ResponseShape::Single(prediction) => vec![prediction],
        ResponseShape::List(list) => list,
        ResponseShape::Nested(nested) => nested.into_iter().next().unwrap_or_default(),
        ResponseShape::Error { error } => {
            return Err(remote_error(backend, 200, error_text(&error)));
        }
    };

    select_best(candidates).ok_or_else(|| unrecognized(backend, body))
}

fn select_best(candidates: Vec<Prediction>) -> Option<Prediction> {
    let mut best: Option<Prediction> = None;
    for candidate in candidates {
        let replace = match &best {
            None => true,
            Some(current) => {
                candidate.score > current.score
                    || (current.score.is_nan() && !candidate.score.is_nan())
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    best
}

/// Best-effort message extraction from an error body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .map_or_else(|| excerpt(body), error_text),
        _ => excerpt(body),
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(error_text)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

/// Whether a failure means the model itself cannot serve requests right now.
pub(crate) fn indicates_unavailable(status: u16, message: &str) -> bool {
    if matches!(status, 404 | 410) {
        return true;
    }
    let message = message.to_ascii_lowercase();
    message.contains("model")
        && ["not found", "does not exist", "loading", "error"]
            .iter()
            .any(|needle| message.contains(needle))
}

/// Build the error for a failed call, separating unavailable models from
/// other remote failures.
pub(crate) fn remote_error(backend: &str, status: u16, message: String) -> ClassifierError {
    if indicates_unavailable(status, &message) {
        ClassifierError::ModelUnavailable {
            backend: backend.to_owned(),
            status,
            message,
        }
    } else {
        ClassifierError::RemoteService {
            backend: backend.to_owned(),
            status,
            message,
        }
    }
}

fn unrecognized(backend: &str, body: &str) -> ClassifierError {
    ClassifierError::UnrecognizedResponse {
        backend: backend.to_owned(),
        body: excerpt(body),
    }
}

fn excerpt(body: &str) -> String {
    crate::filter::truncate_chars(body.trim(), BODY_EXCERPT_CHARS).to_owned()
}

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use tweetmood_core::ProcessingProgress;
use tweetmood_sentiment::PipelineError;

use super::{ApiError, ApiResponse, AppState, RunStatus};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
pub(super) struct Started {
    status: &'static str,
}

impl Started {
    pub(super) fn new() -> Self {
        Self { status: "started" }
    }
}

pub(super) async fn process_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<RunStatus>> {
    Json(ApiResponse::new(state.runs.process_status(), req_id))
}

/// Start a processing run in the background. Only one run may be active.
pub(super) async fn start_processing(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<(StatusCode, Json<ApiResponse<Started>>), ApiError> {
    let Ok(guard) = Arc::clone(&state.runs.process_lock).try_lock_owned() else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "a processing run is already in progress",
        ));
    };

    state.runs.begin_process();

    let runs = state.runs.clone();
    let pipeline = Arc::clone(&state.pipeline);
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        let _guard = guard;
        let observer = |progress: &ProcessingProgress| {
            runs.update_process(|status| status.progress = progress.clone());
        };
        let outcome = pipeline.process_all_cancellable(&observer, &cancel).await;

        runs.update_process(|status| {
            status.running = false;
            match outcome {
                Ok(summary) => status.last_summary = Some(summary),
                Err(PipelineError::Cancelled) => {
                    status.last_error = Some("cancelled".to_owned());
                }
                Err(e) => {
                    tracing::error!(error = %e, "background processing run failed");
                    status.last_error = Some(e.to_string());
                }
            }
        });
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(Started::new(), req_id)),
    ))
}

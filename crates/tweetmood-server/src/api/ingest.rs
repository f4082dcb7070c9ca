use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};

use super::processing::Started;
use super::{ApiError, ApiResponse, AppState, IngestStatus};
use crate::middleware::RequestId;

pub(super) async fn ingest_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<IngestStatus>> {
    Json(ApiResponse::new(state.runs.ingest_status(), req_id))
}

/// Trigger ingestion and poll for new rows in the background.
pub(super) async fn start_ingest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<(StatusCode, Json<ApiResponse<Started>>), ApiError> {
    let Some(trigger) = state.ingest.clone() else {
        return Err(ApiError::new(
            req_id.0,
            "not_configured",
            "ingestion webhook is not configured",
        ));
    };
    let Ok(guard) = Arc::clone(&state.runs.ingest_lock).try_lock_owned() else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "ingestion is already being polled",
        ));
    };

    state.runs.update_ingest(|status| {
        status.running = true;
        status.last_error = None;
    });

    let runs = state.runs.clone();
    let pipeline = Arc::clone(&state.pipeline);
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        let _guard = guard;
        let outcome = trigger.trigger_and_poll(pipeline.gateway(), &cancel).await;
        runs.update_ingest(|status| {
            status.running = false;
            match outcome {
                Ok(outcome) => status.last_outcome = Some(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "background ingestion failed");
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

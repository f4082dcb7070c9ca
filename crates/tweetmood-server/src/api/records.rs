use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use tweetmood_core::{ProcessedRecord, ProcessingStats};

use super::{map_storage_error, normalize_limit, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct RecordsQuery {
    limit: Option<i64>,
}

pub(super) async fn get_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ProcessingStats>>, ApiError> {
    let stats = state
        .pipeline
        .processing_stats()
        .await
        .map_err(|e| map_storage_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(stats, req_id)))
}

pub(super) async fn list_records(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<ApiResponse<Vec<ProcessedRecord>>>, ApiError> {
    let records = state
        .pipeline
        .processed_records(normalize_limit(query.limit))
        .await
        .map_err(|e| map_storage_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(records, req_id)))
}

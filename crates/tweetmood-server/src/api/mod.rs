mod ingest;
mod processing;
mod records;

use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tweetmood_core::{ProcessingProgress, Stage};
use tweetmood_db::{RecordStore, StorageError};
use tweetmood_sentiment::{Classify, IngestOutcome, IngestionTrigger, ProcessingPipeline, RunSummary};

use crate::middleware::{request_id, require_bearer_auth, AuthState, RequestId};

/// The pipeline as the server holds it: storage and classifier behind
/// trait objects.
pub type SharedPipeline = ProcessingPipeline<Arc<dyn RecordStore>, Arc<dyn Classify>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SharedPipeline>,
    pub ingest: Option<Arc<IngestionTrigger>>,
    pub runs: RunTracker,
    /// Cancelled on shutdown; background runs use child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        pipeline: Arc<SharedPipeline>,
        ingest: Option<Arc<IngestionTrigger>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            ingest,
            runs: RunTracker::default(),
            shutdown,
        }
    }
}

/// Latest known state of background processing and ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub progress: ProcessingProgress,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            running: false,
            progress: ProcessingProgress::new(Stage::Idle, 0, "idle"),
            last_summary: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStatus {
    pub running: bool,
    pub last_outcome: Option<IngestOutcome>,
    pub last_error: Option<String>,
}

/// Single-flight guards and status snapshots shared by handlers.
///
/// Status locks are held only to copy a value in or out, never across an
/// await.
#[derive(Clone, Default)]
pub struct RunTracker {
    process_lock: Arc<Mutex<()>>,
    ingest_lock: Arc<Mutex<()>>,
    process_status: Arc<RwLock<RunStatus>>,
    ingest_status: Arc<RwLock<IngestStatus>>,
}

impl RunTracker {
    fn process_status(&self) -> RunStatus {
        self.process_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mark a processing run as started. Progress restarts from idle; the
    /// previous run's summary stays visible until this one finishes.
    fn begin_process(&self) {
        self.update_process(|status| {
            status.running = true;
            status.progress = ProcessingProgress::new(Stage::Idle, 0, "starting");
            status.last_error = None;
        });
    }

    fn update_process(&self, update: impl FnOnce(&mut RunStatus)) {
        update(
            &mut self
                .process_status
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    fn ingest_status(&self) -> IngestStatus {
        self.ingest_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_ingest(&self, update: impl FnOnce(&mut IngestStatus)) {
        update(
            &mut self
                .ingest_status
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    storage: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: RequestId) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id.0),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "not_configured" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> usize {
    let clamped = limit.unwrap_or(50).clamp(1, 500);
    usize::try_from(clamped).unwrap_or(1)
}

pub(super) fn map_storage_error(request_id: String, error: &StorageError) -> ApiError {
    tracing::error!(error = %error, "storage query failed");
    ApiError::new(request_id, "internal_error", "storage query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/stats", get(records::get_stats))
        .route("/api/v1/records", get(records::list_records))
        .route(
            "/api/v1/process",
            get(processing::process_status).post(processing::start_processing),
        )
        .route(
            "/api/v1/ingest",
            get(ingest::ingest_status).post(ingest::start_ingest),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match state.pipeline.processing_stats().await {
        Ok(_) => (
            StatusCode::OK,
            Json(ApiResponse::new(
                HealthData {
                    status: "ok",
                    storage: "ok",
                },
                req_id,
            )),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: storage unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::new(
                    HealthData {
                        status: "degraded",
                        storage: "unavailable",
                    },
                    req_id,
                )),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tweetmood_core::{Sentiment, SentimentResult};
    use tweetmood_db::{MemoryStore, PersistenceGateway, TableNames};
    use tweetmood_sentiment::{BatchConfig, BatchOrchestrator, PipelineConfig};

    use super::*;

    struct UpbeatClassifier;

    #[async_trait]
    impl Classify for UpbeatClassifier {
        async fn classify(&self, _text: &str) -> SentimentResult {
            SentimentResult::from_score(Sentiment::Positive, "LABEL_2", 0.6)
        }
    }

    async fn test_state(rows: Vec<Value>) -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        store.seed("tweets", rows).await;
        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let classifier: Arc<dyn Classify> = Arc::new(UpbeatClassifier);
        let pipeline = ProcessingPipeline::new(
            PersistenceGateway::new(dyn_store, TableNames::default()),
            BatchOrchestrator::new(classifier, BatchConfig::default().without_delays()),
            PipelineConfig {
                cutoff_year: 2024,
                fetch_limit: 100,
            },
        );
        let state = AppState::new(Arc::new(pipeline), None, CancellationToken::new());
        (store, state)
    }

    fn sample_rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "text": "shipping day", "created_at": "2024-04-01T09:00:00Z"}),
            json!({"id": 2, "text": "new release", "created_at": "May 2, 2024 at 10:30 AM"}),
            json!({"id": 3, "text": "ancient", "created_at": "2019-01-01"}),
        ]
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(-4)), 1);
        assert_eq!(normalize_limit(Some(10_000)), 500);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_codes_map_to_statuses() {
        let cases = [
            ("validation_error", StatusCode::BAD_REQUEST),
            ("conflict", StatusCode::CONFLICT),
            ("not_configured", StatusCode::SERVICE_UNAVAILABLE),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let response = ApiError::new("req-1", code, "message").into_response();
            assert_eq!(response.status(), status, "code {code}");
        }
    }

    #[test]
    fn starting_a_run_resets_previous_progress() {
        let runs = RunTracker::default();
        runs.update_process(|status| {
            status.progress = ProcessingProgress::new(Stage::Completed, 100, "done");
            status.last_error = Some("earlier failure".to_owned());
        });

        runs.begin_process();

        let status = runs.process_status();
        assert!(status.running);
        assert_eq!(status.progress.stage, Stage::Idle);
        assert_eq!(status.progress.percent, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn health_is_public_and_reports_storage() {
        let (_store, state) = test_state(Vec::new()).await;
        let app = build_app(
            state,
            AuthState::new(&["secret".to_string()], false).expect("auth"),
        );

        let response = app.oneshot(get("/api/v1/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let json = json_body(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_key() {
        let (_store, state) = test_state(Vec::new()).await;
        let app = build_app(
            state,
            AuthState::new(&["secret".to_string()], false).expect("auth"),
        );

        let denied = app
            .clone()
            .oneshot(get("/api/v1/stats"))
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/stats")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_report_raw_and_processed_counts() {
        let (_store, state) = test_state(sample_rows()).await;
        let app = build_app(state, AuthState::disabled());

        let json = json_body(app.oneshot(get("/api/v1/stats")).await.expect("response")).await;
        assert_eq!(json["data"]["total"], 3);
        assert_eq!(json["data"]["processed"], 0);
        assert_eq!(json["data"]["remaining"], 3);
    }

    #[tokio::test]
    async fn process_runs_in_background_and_reports_summary() {
        let (store, state) = test_state(sample_rows()).await;
        let app = build_app(state, AuthState::disabled());

        let started = app
            .clone()
            .oneshot(post("/api/v1/process"))
            .await
            .expect("response");
        assert_eq!(started.status(), StatusCode::ACCEPTED);

        let mut status = Value::Null;
        for _ in 0..100 {
            status = json_body(
                app.clone()
                    .oneshot(get("/api/v1/process"))
                    .await
                    .expect("response"),
            )
            .await;
            if status["data"]["running"] == false && !status["data"]["last_summary"].is_null() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(status["data"]["progress"]["stage"], "completed");
        assert_eq!(status["data"]["last_summary"]["inserted"], 2);
        assert_eq!(store.rows("processed_tweets").await.len(), 2);

        let records = json_body(
            app.oneshot(get("/api/v1/records?limit=1"))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(records["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(records["data"][0]["sentiment"], "positive");
    }

    #[tokio::test]
    async fn process_conflicts_while_a_run_holds_the_lock() {
        let (_store, state) = test_state(sample_rows()).await;
        let _held = Arc::clone(&state.runs.process_lock)
            .try_lock_owned()
            .expect("lock free");
        let app = build_app(state, AuthState::disabled());

        let response = app.oneshot(post("/api/v1/process")).await.expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "conflict");
    }

    #[tokio::test]
    async fn ingest_without_webhook_is_unavailable() {
        let (_store, state) = test_state(Vec::new()).await;
        let app = build_app(state, AuthState::disabled());

        let response = app.oneshot(post("/api/v1/ingest")).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

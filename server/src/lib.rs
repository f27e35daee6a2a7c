use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scout_core::cache::save_index;
use scout_core::{Corpus, DirStore, EngineConfig, MapView, ScoutError, SearchIndex};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Deserialize)]
pub struct JobParams {
    #[serde(default)]
    pub job_id: String,
}

#[derive(Deserialize)]
pub struct ReinforceRequest {
    pub center_id: Option<i64>,
    #[serde(default)]
    pub selected_ids: Vec<i64>,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<SearchIndex>,
}

/// Load the corpus and its artifacts. A corpus that cannot be read yields an
/// empty index so the server still starts.
pub fn load_index(corpus: &Path, cache_dir: &Path, rebuild: bool) -> Arc<SearchIndex> {
    let corpus = Corpus::load_or_empty(corpus);
    let store = DirStore::new(cache_dir);
    if rebuild {
        let index = SearchIndex::build(corpus, EngineConfig::default());
        if let Err(err) = save_index(&index, &store) {
            tracing::error!(error = %format!("{err:#}"), "failed to persist artifacts");
        }
        return Arc::new(index);
    }
    let (index, outcome) = SearchIndex::load_or_build(corpus, &store, EngineConfig::default());
    tracing::info!(?outcome, num_docs = index.len(), "index ready");
    Arc::new(index)
}

pub fn build_app(index: Arc<SearchIndex>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(health))
        .route("/search", get(search_handler))
        .route("/map_data", get(map_data_handler))
        .route("/job_as_query", get(job_as_query_handler))
        .route("/reinforce", post(reinforce_handler))
        .with_state(AppState { index })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "num_docs": state.index.len(),
        "content_hash": state.index.content_hash(),
    }))
}

/// Search never fails outward: scoring errors are logged and answered with no hits.
pub async fn search_handler(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Response {
    let start = std::time::Instant::now();
    match state.index.search(&params.query) {
        Ok(hits) => {
            tracing::debug!(query = %params.query, hits = hits.len(), took_ms = start.elapsed().as_millis() as u64, "search");
            Json(hits).into_response()
        }
        Err(err) => {
            tracing::error!(query = %params.query, error = %err, "search failed");
            Json(json!([])).into_response()
        }
    }
}

pub async fn map_data_handler(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Json<MapView> {
    match state.index.map_for_query(&params.query) {
        Ok(view) => Json(view),
        Err(err) => {
            tracing::error!(query = %params.query, error = %err, "map view failed");
            Json(MapView::failed(err.to_string()))
        }
    }
}

pub async fn job_as_query_handler(State(state): State<AppState>, Query(params): Query<JobParams>) -> (StatusCode, Json<MapView>) {
    let Ok(job_id) = params.job_id.trim().parse::<i64>() else {
        tracing::warn!(job_id = %params.job_id, "malformed job id");
        return (StatusCode::BAD_REQUEST, Json(MapView::failed("Invalid job ID format")));
    };
    let start = std::time::Instant::now();
    match state.index.map_for_job(job_id) {
        Ok(view) => {
            tracing::debug!(job_id, took_ms = start.elapsed().as_millis() as u64, "job view");
            (StatusCode::OK, Json(view))
        }
        Err(ScoutError::InvalidIdentifier(_)) => (StatusCode::BAD_REQUEST, Json(MapView::failed("Invalid job ID"))),
        Err(err) => {
            tracing::error!(job_id, error = %err, "job view failed");
            (StatusCode::OK, Json(MapView::failed(err.to_string())))
        }
    }
}

pub async fn reinforce_handler(
    State(state): State<AppState>,
    body: Result<Json<ReinforceRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let Some(center_id) = request.center_id else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request data".into());
    };
    let result = state.index.reinforce(center_id, &request.selected_ids, &mut rand::rng());
    match result {
        Ok(view) => Json(view).into_response(),
        Err(ScoutError::InvalidRequest(_)) => error_response(StatusCode::BAD_REQUEST, "Invalid request data".into()),
        Err(ScoutError::InvalidIdentifier(_)) => error_response(StatusCode::BAD_REQUEST, "Invalid job IDs".into()),
        Err(err) => {
            tracing::error!(center_id, error = %err, "reinforcement failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

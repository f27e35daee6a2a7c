use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use scout_core::{Corpus, EngineConfig, RawDocument, SearchIndex};
use serde_json::Value;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

fn posting(title: &str, description: &str, salary: (u64, u64)) -> RawDocument {
    RawDocument {
        title: title.into(),
        description: description.into(),
        skills: Some(vec!["Communication".into()]),
        salary_min: Some(salary.0),
        salary_max: Some(salary.1),
        experience_level: None,
        company: None,
        location: None,
    }
}

fn tiny_app() -> Router {
    let corpus = Corpus::new(vec![
        posting("Data Scientist", "build python models on customer data", (90_000, 120_000)),
        posting("Data Analyst", "sql dashboards on customer data", (60_000, 75_000)),
        posting("Chef", "prepare meals in a restaurant kitchen", (40_000, 50_000)),
        posting("Sous Chef", "assist the head chef in the kitchen", (35_000, 45_000)),
    ]);
    scout_server::build_app(Arc::new(SearchIndex::build(corpus, EngineConfig::default())))
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body: Bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(uri: &str) -> (StatusCode, Value) {
    call(tiny_app(), Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(tiny_app(), req).await
}

#[tokio::test]
async fn search_returns_exact_title_first() {
    let (status, json) = get("/search?query=data%20scientist").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], 0);
    assert_eq!(arr[0]["score"], 1.0);
}

#[tokio::test]
async fn search_without_results_is_ok() {
    let (status, json) = get("/search?query=zzzz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn map_data_centers_on_best_match() {
    let (status, json) = get("/map_data?query=kitchen%20meals").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["center"]["original_id"], 2);
    assert_eq!(json["center"]["id"], 0);
    assert_eq!(json["related"].as_array().unwrap().len(), 3);

    let (_, empty) = get("/map_data?query=").await;
    assert!(empty["center"].is_null());
}

#[tokio::test]
async fn job_as_query_maps_bad_ids_to_400() {
    let (status, json) = get("/job_as_query?job_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["center"]["title"], "Data Analyst");
    assert_eq!(json["related"][0]["original_id"], 0);

    let (status, json) = get("/job_as_query?job_id=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid job ID format");

    let (status, _) = get("/job_as_query?job_id=40").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reinforce_puts_selected_first() {
    let (status, json) = post_json("/reinforce", r#"{"center_id": 0, "selected_ids": [3]}"#).await;
    assert_eq!(status, StatusCode::OK);
    let related = json["related"].as_array().unwrap();
    assert_eq!(related.len(), 3);
    assert_eq!(related[0]["original_id"], 3);
    assert_eq!(related[0]["score"].as_f64().unwrap() as f32, 0.95);
}

#[tokio::test]
async fn reinforce_rejects_bad_input() {
    let (status, _) = post_json("/reinforce", r#"{"center_id": 0, "selected_ids": []}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_json("/reinforce", r#"{"selected_ids": [1]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, json) = post_json("/reinforce", r#"{"center_id": 0, "selected_ids": [9]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid job IDs");
    let (status, _) = post_json("/reinforce", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn load_index_persists_artifacts() {
    let dir = tempdir().unwrap();
    let corpus_path = dir.path().join("jobs.json");
    std::fs::write(
        &corpus_path,
        r#"[{"title": "Nurse", "description": "patient care"}, {"title": "Doctor", "description": "patient diagnosis"}]"#,
    )
    .unwrap();
    let cache = dir.path().join("precomputed");
    let index = scout_server::load_index(&corpus_path, &cache, false);
    assert_eq!(index.len(), 2);
    assert!(cache.join("manifest.json").is_file());

    let (status, json) = call(
        scout_server::build_app(index),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_docs"], 2);
}

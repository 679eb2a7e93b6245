//! HTTP API tests.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use datasource_engine::DataSourceType;
use datasource_server::config::Config;
use datasource_server::repository::{ListRepository, ListSeed};
use datasource_server::{app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn seeds() -> Vec<ListSeed> {
    vec![
        ListSeed {
            list_id: "numbers".into(),
            source_type: DataSourceType::Index,
            list_version: 0,
            page_size: None,
            items: (0..25).map(|i| json!(i)).collect(),
        },
        ListSeed {
            list_id: "feed".into(),
            source_type: DataSourceType::Token,
            list_version: 2,
            page_size: Some(4),
            items: (0..10).map(|i| json!({ "post": i })).collect(),
        },
    ]
}

fn state(auth_secret: Option<&str>) -> AppState {
    let config = Config {
        auth_secret: auth_secret.map(str::to_string),
        default_page_size: 10,
        ..Config::default()
    };
    AppState::new(ListRepository::from_seeds(seeds(), 10).unwrap(), config)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_lists() {
    let (status, body) = send(app(state(None)), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["lists"], 2);
}

#[tokio::test]
async fn summaries_are_sorted() {
    let (status, body) = send(app(state(None)), get("/lists")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["listId"], "feed");
    assert_eq!(body[0]["type"], "dynamicTokenList");
    assert_eq!(body[1]["listId"], "numbers");
    assert_eq!(body[1]["length"], 25);
}

#[tokio::test]
async fn initial_index_payload() {
    let (status, body) = send(
        app(state(None)),
        get("/lists/numbers?startIndex=20&count=10"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "dynamicIndexList");
    assert_eq!(body["startIndex"], 20);
    assert_eq!(body["items"], json!([20, 21, 22, 23, 24]));
    assert_eq!(body["minimumInclusiveIndex"], 0);
    assert_eq!(body["maximumExclusiveIndex"], 25);
    assert_eq!(body["listVersion"], 0);
}

#[tokio::test]
async fn initial_token_payload() {
    let (status, body) = send(app(state(None)), get("/lists/feed?page=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "dynamicTokenList");
    assert_eq!(body["pageToken"], "page-1");
    assert_eq!(body["forwardPageToken"], "forward-2");
    assert_eq!(body["backwardPageToken"], "backward-0");
    assert_eq!(body["items"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn missing_list_is_not_found() {
    let (status, body) = send(app(state(None)), get("/lists/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn fetch_answers_with_correlation_token() {
    let (status, body) = send(
        app(state(None)),
        post(
            "/lists/numbers/fetch",
            json!({ "correlationToken": "101", "listId": "numbers", "startIndex": 10, "count": 5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correlationToken"], "101");
    assert_eq!(body["startIndex"], 10);
    assert_eq!(body["items"], json!([10, 11, 12, 13, 14]));
    assert!(body.get("listVersion").is_none());
}

#[tokio::test]
async fn fetch_for_other_list_rejected() {
    let (status, _) = send(
        app(state(None)),
        post(
            "/lists/numbers/fetch",
            json!({ "correlationToken": "101", "listId": "feed", "pageToken": "page-0" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fetch_with_unknown_page_token_rejected() {
    let (status, _) = send(
        app(state(None)),
        post(
            "/lists/feed/fetch",
            json!({ "correlationToken": "101", "listId": "feed", "pageToken": "forward-40" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn operations_advance_version() {
    let state = state(None);
    let (status, body) = send(
        app(state.clone()),
        post(
            "/lists/numbers/operations",
            json!({ "operations": [
                { "type": "InsertItem", "index": 0, "item": -1 },
                { "type": "DeleteItem", "index": 99 },
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listVersion"], 1);
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
    assert_eq!(body["notified"], 0);

    let summary = state.repository.summary("numbers").unwrap();
    assert_eq!(summary.list_version, 1);
    assert_eq!(summary.length, 26);
}

#[tokio::test]
async fn operations_require_secret_when_configured() {
    let body = json!({ "operations": [{ "type": "DeleteItem", "index": 0 }] });

    let (status, _) = send(
        app(state(Some("s3cret"))),
        post("/lists/numbers/operations", body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = post("/lists/numbers/operations", body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        "Bearer s3cret".parse().unwrap(),
    );
    let (status, body) = send(app(state(Some("s3cret"))), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listVersion"], 1);
}

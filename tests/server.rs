//! HTTP contract tests. The router is served on an ephemeral port and driven
//! with a real client.

mod common;

use common::{PipelineBuilder, ScriptedChat};
use nlsql_harness::server;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const MALE_SQL: &str = "SELECT name FROM people WHERE gender = 'male'";

/// Serve a pipeline scripted with `replies` and return its base URL.
/// The `TempDir` must outlive the requests.
async fn start_server(replies: &[&str]) -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new(ScriptedChat::replying(replies))
        .build(tmp.path())
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(Arc::new(pipeline.orchestrator));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), tmp)
}

#[tokio::test]
async fn test_health() {
    let (base, _tmp) = start_server(&[]).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_query_success() {
    let (base, _tmp) = start_server(&[MALE_SQL]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .json(&json!({ "question": "Liste des personnages masculins" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["question"], "Liste des personnages masculins");
    assert_eq!(body["sql"], MALE_SQL);
    assert_eq!(body["rows"][0]["name"], "Luke Skywalker");
    assert_eq!(body["rows"][1]["name"], "Han Solo");
    assert!(body["answer"].as_str().unwrap().contains("male characters"));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_query_accepts_numeric_and_camel_case_domain() {
    let (base, _tmp) = start_server(&[MALE_SQL, MALE_SQL]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/query", base))
        .json(&json!({ "question": "Male characters", "domain_id": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/api/query", base))
        .json(&json!({ "question": "Male characters", "domainId": "3" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_query_failure_returns_500_with_record() {
    let (base, _tmp) = start_server(&[
        "SELECT * FROM people",
        "SELECT * FROM people",
        "SELECT * FROM people",
    ])
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .json(&json!({ "question": "Everything about people" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sql"], "SELECT * FROM people");
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("failed after 3 attempts"));
    assert!(error.contains("SELECT * is not allowed"));
    assert!(body.get("answer").is_none());
}

#[tokio::test]
async fn test_blank_question_is_bad_request() {
    let (base, _tmp) = start_server(&[MALE_SQL]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .json(&json!({ "question": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "question must not be blank");
}

#[tokio::test]
async fn test_validate_endpoint() {
    let (base, _tmp) = start_server(&[]).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/validate", base))
        .json(&json!({ "sql": "SELECT name FROM people;" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "valid": true, "sql": "SELECT name FROM people" }));

    let body: Value = client
        .post(format!("{}/api/validate", base))
        .json(&json!({ "sql": "DELETE FROM people" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "forbidden command: DELETE");
}

#[tokio::test]
async fn test_index_sync_reports_up_to_date() {
    let (base, _tmp) = start_server(&[]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/index/sync", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "up_to_date" }));
}

//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use insightops::server::{router, AppState};
use serde_json::Value;

use common::{open_app, words};

async fn spawn_server(tmp: &tempfile::TempDir) -> String {
    let app = open_app(tmp.path()).await;
    let state = AppState {
        pipeline: app.pipeline.clone(),
        query: app.query.clone(),
        upload_dir: app.config.paths.ingest_dir.clone(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn health_reports_version() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(&tmp).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn upload_then_search_files_and_stats() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload?filename=handbook.txt", base))
        .body(words(0, 700))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["filename"], "handbook.txt");
    assert_eq!(body["chunks"], 3);
    assert_eq!(body["vectors_added"], 3);

    let again: Value = client
        .post(format!("{}/upload?filename=handbook-copy.txt", base))
        .body(words(0, 700))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["status"], "skipped");
    assert_eq!(again["message"], "File already indexed.");

    let search: Value = client
        .get(format!("{}/search", base))
        .query(&[("q", "w310 w311 w312"), ("k", "2")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["query"], "w310 w311 w312");
    assert_eq!(search["results"][0]["chunk"], 1);
    assert_eq!(search["results"][0]["file"], "handbook.txt");

    let files: Value = client
        .get(format!("{}/files", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(files["count"], 1);
    assert_eq!(files["files"][0]["chunks"], 3);

    let stats: Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_chunks"], 3);
    assert_eq!(stats["total_files"], 1);
}

#[tokio::test]
async fn rejects_unsupported_uploads_and_empty_queries() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload?filename=tool.exe", base))
        .body("MZ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!tmp.path().join("queue").join("tool.exe").exists());

    let resp = client
        .get(format!("{}/search?q=%20", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn upload_names_cannot_escape_the_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(&tmp).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/upload?filename=..%2F..%2Fescape.txt", base))
        .body("hello there")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "escape.txt");
    assert!(!tmp.path().parent().unwrap().join("escape.txt").exists());
}

//! E2E Upload Flow Tests
//!
//! ## Test Coverage
//!
//! - Presign issuance over HTTP
//! - Full client flow: orchestrator -> HTTP presign -> direct transfer
//! - Server-side upload with dimension extraction

use super::common::{png_bytes, E2ETestEnv, TEST_BUCKET};
use kura_uploadr::upload::presign::HttpPresignClient;
use kura_uploadr::upload::{
    TransferExecutor, UploadFile, UploadOrchestrator, UploadPolicy, UploadStatus,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

/// Test: presign returns a complete signed target
#[tokio::test]
async fn test_presign_returns_signed_target() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .presign(json!({
            "fileName": "photo.png",
            "fileType": "image/png",
            "fileSize": 2 * 1024 * 1024,
            "dimensions": {"width": 800, "height": 600}
        }))
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let data = &body["data"];
    let key = data["key"].as_str().unwrap();
    assert!(key.starts_with("uploads/"));
    assert!(key.ends_with("_800x600.png"));
    assert_eq!(
        data["uploadUrl"],
        format!("{}/{}", env.storage.uri(), TEST_BUCKET)
    );
    assert_eq!(
        data["publicUrl"],
        format!("https://cdn.example.com/{}/{}", TEST_BUCKET, key)
    );
    assert_eq!(data["width"], 800);
    assert_eq!(data["height"], 600);

    let fields = data["fields"].as_object().unwrap();
    assert_eq!(fields["key"], key);
    assert_eq!(fields["Content-Type"], "image/png");
    assert_eq!(fields["x-amz-algorithm"], "AWS4-HMAC-SHA256");
    assert!(fields.contains_key("Policy"));
    assert!(fields.contains_key("X-Amz-Signature"));
}

/// Test: a batch goes through the server's presign endpoint and straight
/// to storage
#[tokio::test]
async fn test_orchestrated_upload_through_server() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    Mock::given(method("POST"))
        .and(path(format!("/{}", TEST_BUCKET)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&env.storage)
        .await;

    let presign = Arc::new(HttpPresignClient::new(&env.base_url()).unwrap());
    let orchestrator = UploadOrchestrator::new(
        presign,
        TransferExecutor::new().unwrap(),
        UploadPolicy::default(),
    );

    let file = UploadFile::new("cat.png", "image/png", png_bytes(320, 240));
    let tasks = orchestrator.upload_files(vec![file]).await;

    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.status, UploadStatus::Success, "error: {:?}", task.error);
    assert_eq!(task.progress, 100);
    assert_eq!((task.width, task.height), (Some(320), Some(240)));

    let key = task.key.as_deref().unwrap();
    assert!(key.ends_with("_320x240.png"));
    assert_eq!(
        task.url.as_deref(),
        Some(format!("https://cdn.example.com/{}/{}", TEST_BUCKET, key).as_str())
    );
}

/// Test: server-side upload reads dimensions and stores the object
#[tokio::test]
async fn test_server_side_upload() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    Mock::given(method("PUT"))
        .and(path_regex(format!(
            r"^/{}/uploads/[0-9a-f-]+_640x480\.png$",
            TEST_BUCKET
        )))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-1\""))
        .expect(1)
        .mount(&env.storage)
        .await;

    let response = env
        .put("/api/uploads/cat.png", png_bytes(640, 480), "image/png")
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["dimensions"], json!({"width": 640, "height": 480}));
    assert!(body["data"]["url"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.example.com/e2e-test-bucket/uploads/"));
}

/// Test: health endpoint
#[tokio::test]
async fn test_health_endpoint() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env.get("/health").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

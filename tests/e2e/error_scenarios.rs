//! E2E Error Scenario Tests
//!
//! ## Test Coverage
//!
//! - Presign rejections (type, size, malformed JSON)
//! - Server-side upload rejections
//! - Storage failures surfacing as 502
//! - Unknown routes

use super::common::{png_bytes, E2ETestEnv, TEST_BUCKET};
use bytes::Bytes;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Test: a type outside the allow-list is refused even without client checks
#[tokio::test]
async fn test_presign_rejects_disallowed_type() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .presign(json!({
            "fileName": "logo.svg",
            "fileType": "image/svg+xml",
            "fileSize": 1024,
            "dimensions": null
        }))
        .await;
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("File type image/svg+xml is not supported"));
}

/// Test: oversized declared size is refused
#[tokio::test]
async fn test_presign_rejects_oversized_file() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .presign(json!({
            "fileName": "huge.jpg",
            "fileType": "image/jpeg",
            "fileSize": 15 * 1024 * 1024,
            "dimensions": null
        }))
        .await;
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "File size exceeds 10MB limit");
}

/// Test: malformed JSON gets an error envelope
#[tokio::test]
async fn test_presign_malformed_body() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .post(format!("{}/api/uploads/presign", env.base_url()))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
}

/// Test: server-side upload of a disallowed type never reaches storage
#[tokio::test]
async fn test_server_upload_rejects_type() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&env.storage)
        .await;

    let response = env
        .put("/api/uploads/doc.pdf", Bytes::from_static(b"%PDF-1.4"), "application/pdf")
        .await;
    assert_eq!(response.status(), 400);
}

/// Test: storage refusing the object surfaces as a gateway error
#[tokio::test]
async fn test_server_upload_storage_failure() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
        ))
        .mount(&env.storage)
        .await;

    let response = env
        .put("/api/uploads/cat.png", png_bytes(8, 8), "image/png")
        .await;
    assert_eq!(response.status(), 502);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("AccessDenied"));
}

/// Test: listing failures are reported, not swallowed
#[tokio::test]
async fn test_listing_storage_failure() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    Mock::given(method("GET"))
        .and(path(format!("/{}", TEST_BUCKET)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&env.storage)
        .await;

    let response = env.get("/api/images").await;
    assert_eq!(response.status(), 502);
}

/// Test: unknown routes return 404
#[tokio::test]
async fn test_unknown_route() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env.get("/api/nothing-here").await;
    assert_eq!(response.status(), 404);
}

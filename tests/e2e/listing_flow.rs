//! E2E Listing Tests
//!
//! ## Test Coverage
//!
//! - Dimensions recovered from keys
//! - Newest-first ordering and non-image filtering
//! - Cursor pagination
//! - Image count

use super::common::{list_bucket_xml, E2ETestEnv, TEST_BUCKET};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn mount_listing(env: &E2ETestEnv, objects: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", TEST_BUCKET)))
        .and(query_param("list-type", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_bucket_xml(objects)))
        .mount(&env.storage)
        .await;
}

/// Test: dimensions are parsed back out of keys, unknown ones are null
#[tokio::test]
async fn test_listing_recovers_dimensions() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    mount_listing(
        &env,
        &[
            ("uploads/a_100x200.png", "2024-05-01T10:00:00.000Z"),
            ("uploads/c_0x0.jpg", "2024-05-03T10:00:00.000Z"),
            ("uploads/b_0x0.bin", "2024-05-02T10:00:00.000Z"),
        ],
    )
    .await;

    let response = env.get("/api/images").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    let images = body["images"].as_array().unwrap();
    assert_eq!(body["totalCount"], 2);
    assert_eq!(images.len(), 2);

    // Newest first; .bin is not an image
    assert_eq!(images[0]["key"], "uploads/c_0x0.jpg");
    assert_eq!(images[0]["dimensions"], Value::Null);
    assert_eq!(images[1]["key"], "uploads/a_100x200.png");
    assert_eq!(images[1]["dimensions"], json!({"width": 100, "height": 200}));
    assert_eq!(
        images[1]["url"],
        format!("https://cdn.example.com/{}/uploads/a_100x200.png", TEST_BUCKET)
    );
    assert_eq!(body["nextCursor"], Value::Null);
}

/// Test: a full page hands out a cursor that continues after its last key
#[tokio::test]
async fn test_listing_pagination() {
    let env = E2ETestEnv::with_page_size(2)
        .await
        .expect("Failed to create test env");
    mount_listing(
        &env,
        &[
            ("uploads/1_10x10.png", "2024-05-04T00:00:00.000Z"),
            ("uploads/2_10x10.png", "2024-05-03T00:00:00.000Z"),
            ("uploads/3_10x10.png", "2024-05-02T00:00:00.000Z"),
        ],
    )
    .await;

    let first: Value = env.get("/api/images").await.json().await.unwrap();
    assert_eq!(first["images"].as_array().unwrap().len(), 2);
    assert_eq!(first["nextCursor"], "uploads/2_10x10.png");

    let second: Value = env
        .get("/api/images?cursor=uploads%2F2_10x10.png")
        .await
        .json()
        .await
        .unwrap();
    let images = second["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["key"], "uploads/3_10x10.png");
    assert_eq!(second["nextCursor"], Value::Null);
    assert_eq!(second["totalCount"], 3);
}

/// Test: count only includes images
#[tokio::test]
async fn test_image_count() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    mount_listing(
        &env,
        &[
            ("uploads/a_1x1.webp", "2024-05-01T00:00:00.000Z"),
            ("uploads/b_0x0.bin", "2024-05-01T00:00:00.000Z"),
            ("notes.txt", "2024-05-01T00:00:00.000Z"),
        ],
    )
    .await;

    let body: Value = env.get("/api/images/count").await.json().await.unwrap();
    assert_eq!(body, json!({"count": 1}));
}

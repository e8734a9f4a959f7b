//! Common E2E Test Infrastructure
//!
//! Provides shared utilities for E2E tests:
//! - A running server backed by a mock S3 endpoint
//! - Test image generation
//! - ListObjectsV2 response bodies

use bytes::Bytes;
use image::{ImageFormat, RgbImage};
use kura_uploadr::config::{Config, ConfigLoader};
use kura_uploadr::server::Server;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use wiremock::MockServer;

/// Bucket used by every E2E test
pub const TEST_BUCKET: &str = "e2e-test-bucket";

/// E2E Test Environment
///
/// Runs the server against a wiremock storage endpoint.
pub struct E2ETestEnv {
    pub server_addr: SocketAddr,
    pub storage: MockServer,
    pub client: reqwest::Client,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl E2ETestEnv {
    /// Create a new E2E test environment with a running server
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_page_size(12).await
    }

    pub async fn with_page_size(page_size: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = MockServer::start().await;
        let config = Self::config(&storage.uri(), page_size)?;

        let server = Server::new(config).await?;
        let server_addr = server.local_addr();
        let server_handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            server_addr,
            storage,
            client,
            _server_handle: server_handle,
        })
    }

    fn config(endpoint: &str, page_size: usize) -> Result<Config, Box<dyn std::error::Error>> {
        let yaml = format!(
            r#"
server:
  address: "127.0.0.1:0"
storage:
  bucket: {bucket}
  region: us-east-1
  endpoint: "{endpoint}"
  access_key: minioadmin
  secret_key: minioadmin
  public_url: "https://cdn.example.com"
listing:
  page_size: {page_size}
"#,
            bucket = TEST_BUCKET,
            endpoint = endpoint,
            page_size = page_size,
        );
        Ok(ConfigLoader::from_yaml(&yaml)?)
    }

    /// Get the base URL for the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server_addr)
    }

    pub async fn presign(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/uploads/presign", self.base_url()))
            .json(&body)
            .send()
            .await
            .expect("presign request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn put(&self, path: &str, body: Bytes, content_type: &str) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.base_url(), path))
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }
}

/// Encode a blank PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbImage::new(width, height);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG");
    Bytes::from(buf.into_inner())
}

/// A ListObjectsV2 response body; `(key, last modified)` per object
pub fn list_bucket_xml(objects: &[(&str, &str)]) -> String {
    let contents: String = objects
        .iter()
        .map(|(key, last_modified)| {
            format!(
                "<Contents><Key>{}</Key><LastModified>{}</LastModified><Size>100</Size></Contents>",
                key, last_modified
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>{}</Name><IsTruncated>false</IsTruncated>{}</ListBucketResult>"#,
        TEST_BUCKET, contents
    )
}

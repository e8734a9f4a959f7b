//! S3 Client module
//!
//! A small S3-compatible storage client built on `reqwest` with SigV4
//! signing. It is constructed once at startup and handed to whichever
//! component needs it; nothing here is global.
//!
//! URLs are path-style (`<endpoint>/<bucket>/<key>`), which MinIO, R2 and
//! most S3-compatible services require.
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::s3::{Credentials, S3Client, S3ClientConfig};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3ClientConfig {
//!     bucket: "images".to_string(),
//!     region: "auto".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     public_url: None,
//!     credentials: Credentials::new("minioadmin", "minioadmin"),
//! };
//!
//! let client = S3Client::new(config)?;
//! let response = client
//!     .put_object("uploads/hello.txt", Bytes::from("Hello"), Some("text/plain"))
//!     .await?;
//! println!("ETag: {}", response.etag);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PutObject | `s3.put_object` | bucket, key, bytes, etag, status_code |
//! | ListObjectsV2 | `s3.list_objects_v2` | bucket, prefix, keys, status_code |
//! | Presigned POST | `s3.presigned_post` | bucket, key, content_type |

pub mod credentials;
pub mod post_policy;
pub mod signing;

pub use credentials::{Credentials, CredentialsError, CredentialsProvider};

use crate::config::StorageConfig;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use post_policy::{sign_post_policy, PostPolicyRequest};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use signing::{canonical_query, sha256_hex, sign_request, SignableRequest, EMPTY_PAYLOAD_SHA256};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credentials error: {0}")]
    CredentialsError(#[from] CredentialsError),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error ({status}): {message}")]
    ResponseError { status: u16, message: String },

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Base URL objects are publicly served from. Defaults to the endpoint.
    pub public_url: Option<String>,
    pub credentials: Credentials,
}

impl S3ClientConfig {
    /// Build client configuration from the `storage` config section
    pub fn from_storage(storage: &StorageConfig) -> Result<Self, S3ClientError> {
        Ok(Self {
            bucket: storage.bucket.clone(),
            region: storage.region.clone(),
            endpoint: storage.endpoint.clone(),
            public_url: storage.public_url.clone(),
            credentials: CredentialsProvider::resolve(storage)?,
        })
    }
}

/// S3 Client
pub struct S3Client {
    config: S3ClientConfig,
    http_client: reqwest::Client,
}

impl S3Client {
    /// Create a new S3 client
    pub fn new(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.config.region
    }

    pub fn credentials(&self) -> &Credentials {
        &self.config.credentials
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> String {
        self.config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.config.region))
    }

    /// `<endpoint>/<bucket>`, the target of presigned POST uploads
    pub fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint(), self.config.bucket)
    }

    /// `<endpoint>/<bucket>/<key>`
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), encode_key(key))
    }

    /// Public URL an object is served from once written
    pub fn public_url(&self, key: &str) -> String {
        let base = self
            .config
            .public_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.endpoint());
        format!("{}/{}/{}", base, self.config.bucket, encode_key(key))
    }

    /// Upload an object (PutObject)
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "PUT",
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<S3PutObjectResponse, S3ClientError> {
        let url = parse_url(&self.object_url(key))?;
        let payload_hash = sha256_hex(&body);

        let mut request = self.signed_request(Method::PUT, url, Vec::new(), &payload_hash)?;
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.status_code", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        span.record("s3.etag", etag.as_str());

        tracing::info!(etag = %etag, content_type = ?content_type, "PutObject completed");

        Ok(S3PutObjectResponse { etag })
    }

    /// List one page of objects (ListObjectsV2)
    #[tracing::instrument(
        name = "s3.list_objects_v2",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            http.method = "GET",
            s3.keys = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn list_objects_v2(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsPage, S3ClientError> {
        let mut query = vec![("list-type", "2")];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token));
        }

        let url = parse_url(&self.bucket_url())?;
        let response = self
            .signed_request(Method::GET, url, query, EMPTY_PAYLOAD_SHA256)?
            .send()
            .await
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.status_code", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;
        let result: ListBucketResult = quick_xml::de::from_str(&body)
            .map_err(|e| S3ClientError::ParseError(e.to_string()))?;

        let objects: Vec<S3Object> = result
            .contents
            .into_iter()
            .map(|entry| S3Object {
                url: self.public_url(&entry.key),
                last_modified: entry
                    .last_modified
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                size: entry.size,
                key: entry.key,
            })
            .collect();
        span.record("s3.keys", objects.len());

        Ok(ListObjectsPage {
            objects,
            next_continuation_token: if result.is_truncated {
                result.next_continuation_token
            } else {
                None
            },
        })
    }

    /// List every object, following continuation tokens
    pub async fn list_all_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<S3Object>, S3ClientError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_objects_v2(prefix, token.as_deref()).await?;
            objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(count = objects.len(), "Listed all objects");
        Ok(objects)
    }

    /// Sign a POST policy allowing one upload of `key` with `content_type`
    /// and at most `max_content_length` bytes.
    #[tracing::instrument(
        name = "s3.presigned_post",
        skip(self),
        fields(s3.bucket = %self.config.bucket, s3.key = %key),
        err
    )]
    pub fn presigned_post(
        &self,
        key: &str,
        content_type: &str,
        max_content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedPost, S3ClientError> {
        let expires_in = chrono::Duration::from_std(expires_in)
            .map_err(|e| S3ClientError::SigningError(e.to_string()))?;

        let request = PostPolicyRequest {
            bucket: &self.config.bucket,
            key,
            content_type,
            max_content_length,
            expires_in,
        };
        let signed = sign_post_policy(
            &request,
            &self.config.credentials,
            &self.config.region,
            Utc::now(),
        );

        Ok(PresignedPost {
            url: self.bucket_url(),
            fields: signed.fields,
            expires_at: signed.expires_at,
        })
    }

    fn signed_request(
        &self,
        method: Method,
        mut url: Url,
        query: Vec<(&str, &str)>,
        payload_hash: &str,
    ) -> Result<reqwest::RequestBuilder, S3ClientError> {
        let canonical = canonical_query(query.iter().copied());
        url.set_query(if canonical.is_empty() {
            None
        } else {
            Some(canonical.as_str())
        });

        let host = host_header(&url)?;
        let signable = SignableRequest {
            method: method.as_str(),
            path: url.path(),
            query,
            host: &host,
            payload_hash,
        };
        let signed = sign_request(
            &signable,
            &self.config.credentials,
            &self.config.region,
            Utc::now(),
        );

        let mut request = self.http_client.request(method, url);
        for (name, value) in signed.to_pairs() {
            request = request.header(name, value);
        }
        Ok(request)
    }
}

fn parse_url(raw: &str) -> Result<Url, S3ClientError> {
    Url::parse(raw).map_err(|e| S3ClientError::ConfigError(format!("Invalid URL {}: {}", raw, e)))
}

fn host_header(url: &Url) -> Result<String, S3ClientError> {
    let host = url
        .host_str()
        .ok_or_else(|| S3ClientError::ConfigError(format!("URL has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Encode each key segment, keeping `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(signing::uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

async fn error_from_response(response: reqwest::Response) -> S3ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = quick_xml::de::from_str::<S3ErrorBody>(&body)
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|_| body.chars().take(200).collect());

    tracing::error!(status = status, message = %message, "S3 request failed");
    S3ClientError::ResponseError { status, message }
}

/// S3 PutObject response
#[derive(Debug, Clone)]
pub struct S3PutObjectResponse {
    pub etag: String,
}

/// A stored object as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    pub key: String,
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone)]
pub struct ListObjectsPage {
    pub objects: Vec<S3Object>,
    pub next_continuation_token: Option<String>,
}

/// Signed POST target
#[derive(Debug, Clone)]
pub struct PresignedPost {
    pub url: String,
    pub fields: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListEntry>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct S3ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

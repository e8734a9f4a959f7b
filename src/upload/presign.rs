//! Presigned upload targets
//!
//! [`PresignService`] runs next to the storage credentials and issues
//! short-lived POST targets. Clients reach it through the [`PresignClient`]
//! trait, either in-process or over HTTP with [`HttpPresignClient`].

use super::key::ObjectKeyFormat;
use super::{ImageDimensions, UploadError, UploadPolicy};
use crate::metrics;
use crate::s3::S3Client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Path of the presign endpoint on the server
pub const PRESIGN_PATH: &str = "/api/uploads/presign";

/// Request for a presigned upload target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub dimensions: Option<ImageDimensions>,
}

/// Authorization to write exactly one key with one content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedTarget {
    pub key: String,
    pub upload_url: String,
    pub public_url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Signed form fields, sent before the `file` field
    pub fields: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl PresignedTarget {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Wire envelope of the presign endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PresignedTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PresignResponse {
    pub fn ok(target: PresignedTarget) -> Self {
        Self {
            success: true,
            data: Some(target),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Turn the envelope back into a result
    pub fn into_result(self) -> Result<PresignedTarget, UploadError> {
        match (self.success, self.data) {
            (true, Some(target)) => Ok(target),
            _ => Err(UploadError::Presign(
                self.error
                    .unwrap_or_else(|| "Failed to create upload".to_string()),
            )),
        }
    }
}

/// Something that can hand out presigned targets
#[async_trait]
pub trait PresignClient: Send + Sync {
    async fn create_upload(&self, request: &PresignRequest) -> Result<PresignedTarget, UploadError>;
}

/// Issues presigned POST targets
pub struct PresignService {
    client: Arc<S3Client>,
    policy: UploadPolicy,
    key_format: ObjectKeyFormat,
    expires_in: Duration,
}

impl PresignService {
    pub fn new(client: Arc<S3Client>, policy: UploadPolicy, expires_in: Duration) -> Self {
        Self {
            client,
            policy,
            key_format: ObjectKeyFormat::V1,
            expires_in,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// Validate the request and sign a target for a fresh key.
    ///
    /// Validation runs here regardless of what the client already checked.
    /// Either a complete target is returned or nothing is.
    #[tracing::instrument(
        name = "upload.presign",
        skip(self, request),
        fields(
            upload.file_name = %request.file_name,
            upload.content_type = %request.file_type,
            upload.bytes = request.file_size,
            s3.key = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_upload(
        &self,
        request: &PresignRequest,
    ) -> Result<PresignedTarget, UploadError> {
        if let Err(e) = self
            .policy
            .validate_server(&request.file_type, request.file_size)
        {
            tracing::warn!(reason = %e, "Presign request rejected");
            metrics::record_presign("rejected");
            return Err(e);
        }

        let key = self
            .key_format
            .build(&request.file_name, request.dimensions);
        tracing::Span::current().record("s3.key", key.as_str());

        let post = self
            .client
            .presigned_post(
                &key,
                &request.file_type,
                self.policy.max_file_size(),
                self.expires_in,
            )
            .map_err(|e| {
                metrics::record_presign("failed");
                metrics::record_error("presign_signing");
                UploadError::from(e)
            })?;

        metrics::record_presign("issued");
        tracing::info!(key = %key, expires_at = %post.expires_at, "Issued presigned upload");

        Ok(PresignedTarget {
            public_url: self.client.public_url(&key),
            key,
            upload_url: post.url,
            width: request.dimensions.map(|d| d.width),
            height: request.dimensions.map(|d| d.height),
            fields: post.fields,
            expires_at: post.expires_at,
        })
    }
}

#[async_trait]
impl PresignClient for PresignService {
    async fn create_upload(&self, request: &PresignRequest) -> Result<PresignedTarget, UploadError> {
        PresignService::create_upload(self, request).await
    }
}

/// Requests presigned targets from a remote server
pub struct HttpPresignClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPresignClient {
    /// `server_url` is the server's base URL, e.g. `http://127.0.0.1:8080`
    pub fn new(server_url: &str) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Presign(e.to_string()))?;
        Ok(Self::with_client(http, server_url))
    }

    pub fn with_client(http: reqwest::Client, server_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), PRESIGN_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PresignClient for HttpPresignClient {
    #[tracing::instrument(name = "upload.presign.http", skip(self, request), fields(endpoint = %self.endpoint), err)]
    async fn create_upload(&self, request: &PresignRequest) -> Result<PresignedTarget, UploadError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| UploadError::Presign(format!("Failed to create upload: {}", e)))?;

        let status = response.status();
        let envelope: PresignResponse = response.json().await.map_err(|e| {
            UploadError::Presign(format!(
                "Failed to create upload ({}): {}",
                status.as_u16(),
                e
            ))
        })?;

        envelope.into_result()
    }
}

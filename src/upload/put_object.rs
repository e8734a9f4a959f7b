//! Server-side uploads
//!
//! For callers that cannot write to storage directly, the server receives the
//! bytes, validates them with the same policy, reads the dimensions and
//! writes the object with a single PutObject.
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::s3::{Credentials, S3Client, S3ClientConfig};
//! use kura_uploadr::upload::put_object::ServerUploader;
//! use kura_uploadr::upload::UploadPolicy;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(S3ClientConfig {
//!     bucket: "images".to_string(),
//!     region: "auto".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     public_url: None,
//!     credentials: Credentials::new("minioadmin", "minioadmin"),
//! })?;
//!
//! let uploader = ServerUploader::new(Arc::new(client), UploadPolicy::default());
//! let png = std::fs::read("photo.png")?;
//! let stored = uploader.upload(Bytes::from(png), "photo.png", "image/png").await?;
//! println!("Stored at {}", stored.url);
//! # Ok(())
//! # }
//! ```

use super::dimensions::{is_image_type, safe_extract_image_dimensions};
use super::key::ObjectKeyFormat;
use super::{ImageDimensions, UploadError, UploadPolicy};
use crate::metrics;
use crate::s3::S3Client;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Result of a server-side upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUpload {
    pub key: String,
    pub url: String,
    pub dimensions: Option<ImageDimensions>,
}

/// Uploads bytes received by the server
pub struct ServerUploader {
    client: Arc<S3Client>,
    policy: UploadPolicy,
    key_format: ObjectKeyFormat,
}

impl ServerUploader {
    pub fn new(client: Arc<S3Client>, policy: UploadPolicy) -> Self {
        Self {
            client,
            policy,
            key_format: ObjectKeyFormat::V1,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate, measure and store `data`.
    ///
    /// Dimensions that cannot be read do not fail the upload; the key then
    /// records them as unknown.
    #[tracing::instrument(
        name = "upload.server",
        skip(self, data),
        fields(
            upload.file_name = %file_name,
            upload.content_type = %content_type,
            upload.bytes = data.len(),
            s3.key = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        data: Bytes,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredUpload, UploadError> {
        let size = data.len() as u64;
        self.policy.validate_server(content_type, size)?;

        let start_time = Instant::now();
        let dimensions = if is_image_type(content_type) {
            safe_extract_image_dimensions(data.clone()).await
        } else {
            None
        };

        let key = self.key_format.build(file_name, dimensions);
        tracing::Span::current().record("s3.key", key.as_str());

        match self
            .client
            .put_object(&key, data, Some(content_type))
            .await
        {
            Ok(response) => {
                metrics::record_upload_success("server", size);
                metrics::record_upload_duration("server", start_time.elapsed().as_secs_f64());
                tracing::info!(key = %key, etag = %response.etag, "Stored upload");
                Ok(StoredUpload {
                    url: self.client.public_url(&key),
                    key,
                    dimensions,
                })
            }
            Err(e) => {
                metrics::record_upload_failure("server");
                metrics::record_error("put_object");
                Err(e.into())
            }
        }
    }
}

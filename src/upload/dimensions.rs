//! Image dimension extraction
//!
//! Dimensions are enrichment, never a reason to fail an upload: callers on
//! the upload path use [`safe_extract_image_dimensions`].

use super::UploadError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Whether a declared content type should go through dimension extraction
pub fn is_image_type(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

/// Read width and height from encoded image bytes.
///
/// Only the header is decoded, on the blocking thread pool so the caller's
/// executor is never stalled. There is no timeout; wrap the call if one is
/// needed.
#[tracing::instrument(name = "upload.extract_dimensions", skip(data), fields(upload.bytes = data.len()))]
pub async fn extract_image_dimensions(data: Bytes) -> Result<ImageDimensions, UploadError> {
    tokio::task::spawn_blocking(move || read_dimensions(&data))
        .await
        .map_err(|e| UploadError::Dimensions(e.to_string()))?
}

/// Like [`extract_image_dimensions`] but failures become `None`.
pub async fn safe_extract_image_dimensions(data: Bytes) -> Option<ImageDimensions> {
    match extract_image_dimensions(data).await {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            tracing::debug!(error = %e, "Dimension extraction failed, continuing without");
            None
        }
    }
}

fn read_dimensions(data: &[u8]) -> Result<ImageDimensions, UploadError> {
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| UploadError::Dimensions(e.to_string()))?;

    Ok(ImageDimensions { width, height })
}

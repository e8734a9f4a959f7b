//! Upload module
//!
//! The direct-upload pipeline: validation, dimension extraction, key
//! derivation, presigned POST issuance, direct transfer and the per-file
//! orchestrator, plus the listing path that reads dimensions back out of keys.

use crate::s3::S3ClientError;
use thiserror::Error;

pub mod dimensions;
pub mod key;
pub mod listing;
pub mod orchestrator;
pub mod policy;
pub mod presign;
pub mod put_object;
pub mod transfer;

pub use dimensions::ImageDimensions;
pub use key::ObjectKeyFormat;
pub use orchestrator::{UploadFile, UploadOrchestrator, UploadStatus, UploadTask};
pub use policy::UploadPolicy;
pub use presign::{PresignClient, PresignRequest, PresignService, PresignedTarget};
pub use transfer::TransferExecutor;

/// Upload errors
///
/// The `Display` output of each variant is what ends up as a task's error
/// reason, so messages are written for end users.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File size exceeds {limit_mb}MB limit")]
    FileTooLarge { size: u64, limit_mb: f64 },

    #[error("File type {content_type} is not supported. Allowed types: {allowed}")]
    UnsupportedType {
        content_type: String,
        allowed: String,
    },

    #[error("Unable to read image dimensions: {0}")]
    Dimensions(String),

    #[error("Storage error: {0}")]
    Storage(#[from] S3ClientError),

    #[error("{0}")]
    Presign(String),

    #[error("Upload failed ({status})")]
    TransferFailed { status: u16 },

    #[error("Upload failed: network error: {0}")]
    Network(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the error is a policy rejection (size or type)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::FileTooLarge { .. }
                | UploadError::UnsupportedType { .. }
                | UploadError::InvalidContentType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_failed_message_carries_status() {
        let err = UploadError::TransferFailed { status: 403 };
        assert_eq!(err.to_string(), "Upload failed (403)");
    }

    #[test]
    fn test_validation_classification() {
        let err = UploadError::FileTooLarge {
            size: 1,
            limit_mb: 10.0,
        };
        assert!(err.is_validation());
        assert!(!UploadError::Cancelled.is_validation());
    }
}

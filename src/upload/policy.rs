//! Upload policy
//!
//! Size and MIME-type rules shared by client-side validation and the
//! server's re-validation. The client check only saves a round-trip; the
//! server check is the one that counts.

use super::UploadError;

/// Maximum accepted file size (10 MiB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Raster image types accepted for upload
pub const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Size and type limits for uploads
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types: ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Create a policy with custom limits
    pub fn new(max_file_size: u64, allowed_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_types,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }

    /// Whether `content_type` is on the allow-list (exact match)
    pub fn allows_type(&self, content_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == content_type)
    }

    /// Client-side validation: size first, then type.
    pub fn validate(&self, size: u64, content_type: &str) -> Result<(), UploadError> {
        self.check_size(size)?;
        self.check_type(content_type)
    }

    /// Server-side re-validation: type first, then size.
    pub fn validate_server(&self, content_type: &str, size: u64) -> Result<(), UploadError> {
        self.check_type(content_type)?;
        self.check_size(size)
    }

    fn check_size(&self, size: u64) -> Result<(), UploadError> {
        if size > self.max_file_size {
            return Err(UploadError::FileTooLarge {
                size,
                limit_mb: self.max_file_size as f64 / 1024.0 / 1024.0,
            });
        }
        Ok(())
    }

    fn check_type(&self, content_type: &str) -> Result<(), UploadError> {
        if !self.allows_type(content_type) {
            return Err(UploadError::UnsupportedType {
                content_type: content_type.to_string(),
                allowed: self.allowed_types.join(", "),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_allowed_image() {
        let policy = UploadPolicy::default();
        assert!(policy.validate(2 * 1024 * 1024, "image/png").is_ok());
        assert!(policy.validate(MAX_FILE_SIZE, "image/webp").is_ok());
    }

    #[test]
    fn test_rejects_oversized_file() {
        let policy = UploadPolicy::default();
        let err = policy
            .validate(15 * 1024 * 1024, "image/jpeg")
            .unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds 10MB limit");
    }

    #[test]
    fn test_rejects_unlisted_type() {
        let policy = UploadPolicy::default();
        let err = policy.validate(100, "application/pdf").unwrap_err();
        assert_eq!(
            err.to_string(),
            "File type application/pdf is not supported. Allowed types: \
             image/jpeg, image/jpg, image/png, image/gif, image/webp"
        );
    }

    #[test]
    fn test_client_order_reports_size_first() {
        let policy = UploadPolicy::default();
        let err = policy.validate(MAX_FILE_SIZE + 1, "text/plain").unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { .. }));
    }

    #[test]
    fn test_server_order_reports_type_first() {
        let policy = UploadPolicy::default();
        let err = policy
            .validate_server("text/plain", MAX_FILE_SIZE + 1)
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType { .. }));
    }

    #[test]
    fn test_type_match_is_exact() {
        let policy = UploadPolicy::default();
        assert!(!policy.allows_type("IMAGE/PNG"));
        assert!(!policy.allows_type("image/png; charset=binary"));
    }

    #[test]
    fn test_custom_limit_message() {
        let policy = UploadPolicy::new(5 * 1024 * 1024 / 2, vec!["image/png".into()]);
        let err = policy.validate(3 * 1024 * 1024, "image/png").unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds 2.5MB limit");
    }
}

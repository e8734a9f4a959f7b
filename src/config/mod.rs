//! Configuration module for Kura Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::upload::policy::{UploadPolicy, ALLOWED_TYPES, MAX_FILE_SIZE};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR_PATTERN: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var pattern is valid");
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("S3_BUCKET_NAME", "images");
/// assert_eq!(expand_env_vars("bucket: ${S3_BUCKET_NAME}"), "bucket: images");
/// assert_eq!(expand_env_vars("${MISSING:-auto}"), "auto");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket cannot be empty".into(),
            ));
        }

        if self.storage.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.storage.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid storage endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if let Some(ref public_url) = self.storage.public_url {
            if !is_valid_http_url(public_url) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid public URL '{}': must start with http:// or https://",
                    public_url
                )));
            }
        }

        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be greater than zero".into(),
            ));
        }

        if self.upload.allowed_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.allowed_types cannot be empty".into(),
            ));
        }

        if !(1..=3600).contains(&self.upload.presign_expiry_seconds) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid presign expiry {}s: must be between 1 and 3600",
                self.upload.presign_expiry_seconds
            )));
        }

        if self.listing.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "listing.page_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Object storage configuration
///
/// ```yaml
/// storage:
///   bucket: "${S3_BUCKET_NAME}"
///   region: "${S3_REGION:-auto}"
///   endpoint: "${S3_ENDPOINT}"
///   access_key: "${S3_ACCESS_KEY_ID}"
///   secret_key: "${S3_SECRET_ACCESS_KEY}"
///   public_url: "https://cdn.example.com"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Base URL objects are served from. Defaults to the endpoint.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_region() -> String {
    "auto".to_string()
}

/// Upload policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Lifetime of an issued presigned POST target.
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_seconds: u64,
}

impl UploadConfig {
    /// Policy shared by the presign endpoint and server-side uploads
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_file_size, self.allowed_types.clone())
    }

    /// Presign expiry as a [`Duration`]
    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_seconds)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
            presign_expiry_seconds: default_presign_expiry(),
        }
    }
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_allowed_types() -> Vec<String> {
    ALLOWED_TYPES.iter().map(|t| t.to_string()).collect()
}

fn default_presign_expiry() -> u64 {
    60
}

/// Image listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    12
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig {
                bucket: "images".into(),
                region: "us-east-1".into(),
                endpoint: Some("http://localhost:9000".into()),
                access_key: None,
                secret_key: None,
                session_token: None,
                public_url: None,
            },
            upload: UploadConfig::default(),
            listing: ListingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.allowed_types.len(), 5);
        assert_eq!(config.presign_expiry(), Duration::from_secs(60));
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_bucket() {
        let mut config = test_config();
        config.storage.bucket = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_endpoint() {
        let mut config = test_config();
        config.storage.endpoint = Some("localhost:9000".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_expiry_out_of_range() {
        let mut config = test_config();
        config.upload.presign_expiry_seconds = 0;
        assert!(config.validate().is_err());

        config.upload.presign_expiry_seconds = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_allow_list() {
        let mut config = test_config();
        config.upload.allowed_types.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let expanded = expand_env_vars("region: ${KURA_TEST_SURELY_UNSET:-auto}");
        assert_eq!(expanded, "region: auto");
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown_placeholder() {
        let expanded = expand_env_vars("bucket: ${KURA_TEST_SURELY_UNSET}");
        assert_eq!(expanded, "bucket: ${KURA_TEST_SURELY_UNSET}");
    }
}

//! Storage credentials
//!
//! Credentials come from the `storage` section of the configuration, or from
//! the environment when the section leaves them out.
//!
//! A configured value that is blank, or still holds an unexpanded
//! `${VAR}` placeholder, counts as absent.
//!
//! # Example
//!
//! ```
//! use kura_uploadr::s3::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::StorageConfig;
use thiserror::Error;

/// Environment variables checked for the access key, in order
const ACCESS_KEY_VARS: &[&str] = &["S3_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"];

/// Environment variables checked for the secret key, in order
const SECRET_KEY_VARS: &[&str] = &["S3_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"];

/// Environment variables checked for a session token, in order
const SESSION_TOKEN_VARS: &[&str] = &["S3_SESSION_TOKEN", "AWS_SESSION_TOKEN"];

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Access key pair, optionally with a session token
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// Factory methods for loading credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from the environment
    ///
    /// Looks for `S3_ACCESS_KEY_ID` / `S3_SECRET_ACCESS_KEY` /
    /// `S3_SESSION_TOKEN`, falling back to the `AWS_` equivalents.
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = first_env(ACCESS_KEY_VARS).ok_or_else(|| {
            CredentialsError::MissingCredentials("S3_ACCESS_KEY_ID not set".into())
        })?;
        let secret_key = first_env(SECRET_KEY_VARS).ok_or_else(|| {
            CredentialsError::MissingCredentials("S3_SECRET_ACCESS_KEY not set".into())
        })?;

        Ok(match first_env(SESSION_TOKEN_VARS) {
            Some(token) => Credentials::with_session_token(access_key, secret_key, token),
            None => Credentials::new(access_key, secret_key),
        })
    }

    /// Load credentials from the storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Credentials, CredentialsError> {
        let access_key = configured(&config.access_key).ok_or_else(|| {
            CredentialsError::MissingCredentials("access_key not set in config".into())
        })?;
        let secret_key = configured(&config.secret_key).ok_or_else(|| {
            CredentialsError::MissingCredentials("secret_key not set in config".into())
        })?;

        Ok(match configured(&config.session_token) {
            Some(token) => Credentials::with_session_token(access_key, secret_key, token),
            None => Credentials::new(access_key, secret_key),
        })
    }

    /// Configuration first, then the environment if the config has no keys
    pub fn resolve(config: &StorageConfig) -> Result<Credentials, CredentialsError> {
        if configured(&config.access_key).is_none() && configured(&config.secret_key).is_none() {
            return Self::from_env();
        }
        Self::from_config(config)
    }
}

/// A usable configured value: not blank and not a leftover `${VAR}`
fn configured(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.contains("${"))
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

//! Browser-based POST uploads
//!
//! Builds and signs the POST policy document that lets a client write one
//! object directly to the bucket. Every limit lives in the signed policy's
//! conditions, so storage enforces them, not the client.

use super::credentials::Credentials;
use super::signing::{
    credential_scope, format_amz_date, format_date, hmac_sha256, signing_key, ALGORITHM, SERVICE,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A single policy condition
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyCondition {
    /// `{"field": "value"}`
    Exact(String, String),
    /// `["eq", "$field", "value"]`
    Eq(String, String),
    /// `["content-length-range", min, max]`
    ContentLengthRange(u64, u64),
}

impl PolicyCondition {
    fn to_json(&self) -> Value {
        match self {
            PolicyCondition::Exact(field, value) => {
                let mut object = serde_json::Map::new();
                object.insert(field.clone(), Value::String(value.clone()));
                Value::Object(object)
            }
            PolicyCondition::Eq(field, value) => json!(["eq", format!("${}", field), value]),
            PolicyCondition::ContentLengthRange(min, max) => {
                json!(["content-length-range", min, max])
            }
        }
    }
}

/// POST policy document
#[derive(Debug, Clone)]
pub struct PostPolicy {
    expiration: DateTime<Utc>,
    conditions: Vec<PolicyCondition>,
}

impl PostPolicy {
    pub fn new(expiration: DateTime<Utc>) -> Self {
        Self {
            expiration,
            conditions: Vec::new(),
        }
    }

    pub fn condition(mut self, condition: PolicyCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn conditions(&self) -> &[PolicyCondition] {
        &self.conditions
    }

    pub fn to_json(&self) -> Value {
        json!({
            "expiration": self.expiration.to_rfc3339_opts(SecondsFormat::Millis, true),
            "conditions": self.conditions.iter().map(PolicyCondition::to_json).collect::<Vec<_>>(),
        })
    }

    /// Base64 of the JSON document, the value of the `Policy` form field
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_json().to_string())
    }
}

/// What a presigned POST authorizes
#[derive(Debug, Clone)]
pub struct PostPolicyRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub content_type: &'a str,
    pub max_content_length: u64,
    pub expires_in: Duration,
}

/// Signed form fields for a POST upload
#[derive(Debug, Clone)]
pub struct SignedPostFields {
    pub fields: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

/// Build the policy for `request` and sign it.
///
/// The returned fields must be sent as form fields ahead of the `file` field.
pub fn sign_post_policy(
    request: &PostPolicyRequest<'_>,
    credentials: &Credentials,
    region: &str,
    issued_at: DateTime<Utc>,
) -> SignedPostFields {
    let date = format_date(issued_at);
    let amz_date = format_amz_date(issued_at);
    let credential = format!(
        "{}/{}",
        credentials.access_key_id(),
        credential_scope(&date, region)
    );
    let expires_at = issued_at + request.expires_in;

    let mut policy = PostPolicy::new(expires_at)
        .condition(PolicyCondition::Exact("bucket".into(), request.bucket.into()))
        .condition(PolicyCondition::Eq("key".into(), request.key.into()))
        .condition(PolicyCondition::Eq(
            "Content-Type".into(),
            request.content_type.into(),
        ))
        .condition(PolicyCondition::ContentLengthRange(
            0,
            request.max_content_length,
        ))
        .condition(PolicyCondition::Exact(
            "x-amz-algorithm".into(),
            ALGORITHM.into(),
        ))
        .condition(PolicyCondition::Exact(
            "x-amz-credential".into(),
            credential.clone(),
        ))
        .condition(PolicyCondition::Exact("x-amz-date".into(), amz_date.clone()));

    if let Some(token) = credentials.session_token() {
        policy = policy.condition(PolicyCondition::Exact(
            "x-amz-security-token".into(),
            token.into(),
        ));
    }

    let encoded = policy.encode();
    let key = signing_key(credentials.secret_access_key(), &date, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, encoded.as_bytes()));

    let mut fields = BTreeMap::new();
    fields.insert("key".to_string(), request.key.to_string());
    fields.insert("Content-Type".to_string(), request.content_type.to_string());
    fields.insert("x-amz-algorithm".to_string(), ALGORITHM.to_string());
    fields.insert("x-amz-credential".to_string(), credential);
    fields.insert("x-amz-date".to_string(), amz_date);
    if let Some(token) = credentials.session_token() {
        fields.insert("x-amz-security-token".to_string(), token.to_string());
    }
    fields.insert("Policy".to_string(), encoded);
    fields.insert("X-Amz-Signature".to_string(), signature);

    SignedPostFields { fields, expires_at }
}

/// Decode a `Policy` field back into JSON
pub fn decode_policy(encoded: &str) -> Option<Value> {
    let raw = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&raw).ok()
}

//! AWS Signature Version 4
//!
//! Just enough SigV4 for the storage client: signing-key derivation, header
//! signing of REST requests, and signing of POST policy documents.

use super::credentials::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Service name used in the credential scope
pub const SERVICE: &str = "s3";

/// SHA256 of an empty payload
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Characters left unescaped by SigV4 URI encoding: `A-Z a-z 0-9 - _ . ~`
const SIGV4_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Compute HMAC-SHA256
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute SHA256 hash as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// `YYYYMMDD`
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

/// `YYYYMMDDTHHMMSSZ`
pub fn format_amz_date(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Derive the signing key
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, date)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// `date/region/service/aws4_request`
pub fn credential_scope(date: &str, region: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, SERVICE)
}

/// URI-encode a single value per SigV4 rules
pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, SIGV4_ENCODE_SET).to_string()
}

/// Canonical URI: each path segment decoded then re-encoded, `/` preserved
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| uri_encode(&percent_decode_str(segment).decode_utf8_lossy()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical query string: pairs encoded, sorted by name then value
pub fn canonical_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut encoded: Vec<(String, String)> = pairs
        .into_iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// A request to be signed with the `Authorization` header scheme
#[derive(Debug)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    /// Raw (possibly percent-encoded) path, e.g. `/bucket/uploads/a.png`
    pub path: &'a str,
    /// Decoded query pairs
    pub query: Vec<(&'a str, &'a str)>,
    /// `host[:port]` as sent on the wire
    pub host: &'a str,
    /// Hex SHA256 of the payload
    pub payload_hash: &'a str,
}

/// Headers to attach to a signed request
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs to add to the outgoing request
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("authorization", self.authorization.clone()),
            ("x-amz-date", self.amz_date.clone()),
            ("x-amz-content-sha256", self.content_sha256.clone()),
        ];
        if let Some(ref token) = self.security_token {
            headers.push(("x-amz-security-token", token.clone()));
        }
        headers
    }
}

/// Sign a REST request, producing the headers to send with it.
///
/// Signed headers are `host`, `x-amz-content-sha256`, `x-amz-date` and, with
/// temporary credentials, `x-amz-security-token`.
pub fn sign_request(
    request: &SignableRequest<'_>,
    credentials: &Credentials,
    region: &str,
    at: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = format_amz_date(at);
    let date = format_date(at);

    let mut canonical_headers = format!(
        "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        request.host.trim(),
        request.payload_hash,
        amz_date
    );
    let mut signed_headers = String::from("host;x-amz-content-sha256;x-amz-date");
    if let Some(token) = credentials.session_token() {
        canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token.trim()));
        signed_headers.push_str(";x-amz-security-token");
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri(request.path),
        canonical_query(request.query.iter().copied()),
        canonical_headers,
        signed_headers,
        request.payload_hash
    );

    let scope = credential_scope(&date, region);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(credentials.secret_access_key(), &date, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id(),
            scope,
            signed_headers,
            signature
        ),
        amz_date,
        content_sha256: request.payload_hash.to_string(),
        security_token: credentials.session_token().map(str::to_string),
    }
}

//! Request routing and handlers

use super::AppState;
use crate::metrics;
use crate::upload::presign::{PresignResponse, PRESIGN_PATH};
use crate::upload::{PresignRequest, UploadError};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prefix of server-side upload paths
const UPLOAD_PATH_PREFIX: &str = "/api/uploads/";

/// Largest presign request body accepted
const MAX_JSON_BODY: usize = 64 * 1024;

pub(super) async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    info!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") if state.metrics_enabled => metrics_response(),
        (&Method::POST, PRESIGN_PATH) => presign(req, &state).await,
        (&Method::GET, "/api/images") => {
            let cursor = query_param(req.uri().query(), "cursor");
            list_images(&state, cursor.as_deref()).await
        }
        (&Method::GET, "/api/images/count") => count_images(&state).await,
        (&Method::PUT, p) if p.starts_with(UPLOAD_PATH_PREFIX) => {
            let file_name = percent_decode_str(&p[UPLOAD_PATH_PREFIX.len()..])
                .decode_utf8_lossy()
                .into_owned();
            server_upload(req, &state, &file_name).await
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

async fn presign(req: Request<Incoming>, state: &AppState) -> Response<String> {
    let body = match read_body(req, MAX_JSON_BODY).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            return json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &PresignResponse::err("Request body too large"),
            )
        }
        Err(BodyError::Read(e)) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &PresignResponse::err(format!("Failed to read body: {}", e)),
            )
        }
    };

    let request: PresignRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed presign request: {}", e);
            return json_response(
                StatusCode::BAD_REQUEST,
                &PresignResponse::err(format!("Invalid request: {}", e)),
            );
        }
    };

    match state.presign.create_upload(&request).await {
        Ok(target) => json_response(StatusCode::OK, &PresignResponse::ok(target)),
        Err(e) => json_response(error_status(&e), &PresignResponse::err(e.to_string())),
    }
}

async fn server_upload(req: Request<Incoming>, state: &AppState, file_name: &str) -> Response<String> {
    if file_name.trim().is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({"success": false, "error": "File name cannot be empty"}),
        );
    }

    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let policy = state.uploader.policy();
    let limit = policy.max_file_size();
    let body = match read_body(req, usize::try_from(limit).unwrap_or(usize::MAX)).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            // Report as the smallest size over the limit, in server check order
            let message = policy
                .validate_server(&content_type, limit.saturating_add(1))
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Request body too large".to_string());
            return json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({"success": false, "error": message}),
            );
        }
        Err(BodyError::Read(e)) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"success": false, "error": format!("Failed to read body: {}", e)}),
            )
        }
    };

    info!("Upload request for {}: {} bytes received", file_name, body.len());

    match state.uploader.upload(body, file_name, &content_type).await {
        Ok(stored) => json_response(StatusCode::OK, &json!({"success": true, "data": stored})),
        Err(e) => json_response(
            error_status(&e),
            &json!({"success": false, "error": e.to_string()}),
        ),
    }
}

async fn list_images(state: &AppState, cursor: Option<&str>) -> Response<String> {
    match state.lister.list_images(cursor).await {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(e) => {
            error!("Listing failed: {}", e);
            json_response(error_status(&e), &json!({"error": e.to_string()}))
        }
    }
}

async fn count_images(state: &AppState) -> Response<String> {
    match state.lister.count_images().await {
        Ok(count) => json_response(StatusCode::OK, &json!({"count": count})),
        Err(e) => {
            error!("Count failed: {}", e);
            json_response(error_status(&e), &json!({"error": e.to_string()}))
        }
    }
}

fn metrics_response() -> Response<String> {
    match metrics::gather_text() {
        Ok(text) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(text)
            .expect("Failed to build metrics response"),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

/// 400 for policy rejections, 502 for everything storage side
fn error_status(error: &UploadError) -> StatusCode {
    if error.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    }
}

enum BodyError {
    TooLarge,
    Read(String),
}

async fn read_body(req: Request<Incoming>, limit: usize) -> Result<Bytes, BodyError> {
    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e.to_string())),
    }
}

/// Decoded value of `name` in a query string, `+` read as a space
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            percent_decode_str(&value.replace('+', " "))
                .decode_utf8_lossy()
                .into_owned()
        })
        .filter(|value| !value.is_empty())
}

fn text_response(status: StatusCode, body: &str) -> Response<String> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(body.to_string())
        .expect("Failed to build text response")
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<String> {
    match serde_json::to_string(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(json)
            .expect("Failed to build JSON response"),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

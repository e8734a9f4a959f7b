//! Direct transfer to storage
//!
//! Sends the file straight to the presigned endpoint as a multipart form.
//! The signed fields go first and the `file` part goes last, as form-based
//! object-store uploads require.

use super::orchestrator::UploadFile;
use super::presign::PresignedTarget;
use super::UploadError;
use crate::metrics;
use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Size of the chunks the file body is streamed in
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback, called with a percentage in `0..=100`
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Performs direct uploads against presigned targets
#[derive(Clone)]
pub struct TransferExecutor {
    http: reqwest::Client,
    chunk_size: usize,
}

impl TransferExecutor {
    pub fn new() -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Use a different chunk size; smaller chunks mean finer progress
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upload `file` to `target`.
    ///
    /// Progress is reported as the transport pulls chunks of the body, and
    /// once more with 100 when storage answers 2xx. Cancelling `cancel` drops
    /// the in-flight request.
    #[tracing::instrument(
        name = "upload.transfer",
        skip_all,
        fields(
            s3.key = %target.key,
            upload.bytes = file.data.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        target: &PresignedTarget,
        file: &UploadFile,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let total = file.data.len() as u64;
        let form = self.build_form(target, file, on_progress.clone())?;
        let start_time = Instant::now();

        let request = self.http.post(&target.upload_url).multipart(form).send();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Transfer cancelled");
                metrics::record_upload_failure("direct");
                return Err(UploadError::Cancelled);
            }
            result = request => result,
        };

        let response = result.map_err(|e| {
            metrics::record_upload_failure("direct");
            metrics::record_error("transfer_network");
            UploadError::Network(e.to_string())
        })?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Storage rejected transfer");
            metrics::record_upload_failure("direct");
            metrics::record_error("transfer_status");
            return Err(UploadError::TransferFailed {
                status: status.as_u16(),
            });
        }

        on_progress(100);
        metrics::record_upload_success("direct", total);
        metrics::record_upload_duration("direct", start_time.elapsed().as_secs_f64());
        Ok(())
    }

    fn build_form(
        &self,
        target: &PresignedTarget,
        file: &UploadFile,
        on_progress: ProgressCallback,
    ) -> Result<Form, UploadError> {
        let total = file.data.len() as u64;
        let body = progress_body(file.data.clone(), self.chunk_size, on_progress);

        let part = Part::stream_with_length(body, total)
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| UploadError::InvalidContentType(format!("{}: {}", file.content_type, e)))?;

        let form = target
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        Ok(form.part("file", part))
    }
}

/// Body that reports how much of `data` the transport has taken
fn progress_body(data: Bytes, chunk_size: usize, on_progress: ProgressCallback) -> Body {
    let total = data.len() as u64;
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let chunks = stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        on_progress(percent(sent, total));
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    Body::wrap_stream(chunks)
}

/// `round(sent * 100 / total)`, 100 for an empty body
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as f64 / total as f64) * 100.0).round() as u8
}

//! Upload orchestrator
//!
//! Drives a batch of files through the pipeline one at a time: validate,
//! extract dimensions, presign, transfer. Each file gets an [`UploadTask`]
//! whose status only moves forward:
//!
//! ```text
//! Idle -> Uploading -> Success
//!   |         |
//!   +---------+------> Error
//! ```
//!
//! The task list is published through a `watch` channel. Every change
//! replaces the whole list, so observers never see a half-applied update.
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::upload::presign::HttpPresignClient;
//! use kura_uploadr::upload::{TransferExecutor, UploadFile, UploadOrchestrator, UploadPolicy};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let presign = Arc::new(HttpPresignClient::new("http://127.0.0.1:8080")?);
//! let orchestrator =
//!     UploadOrchestrator::new(presign, TransferExecutor::new()?, UploadPolicy::default());
//!
//! let file = UploadFile::from_path("photo.png").await?;
//! for task in orchestrator.upload_files(vec![file]).await {
//!     println!("{} {:?} {:?}", task.file_name, task.status, task.url);
//! }
//! # Ok(())
//! # }
//! ```

use super::dimensions::{is_image_type, safe_extract_image_dimensions};
use super::presign::{PresignClient, PresignRequest};
use super::transfer::{ProgressCallback, TransferExecutor};
use super::{UploadError, UploadPolicy};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A file handed to the orchestrator
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(name, content_type, Bytes::from(data)))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Status of one file in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Idle,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Idle, UploadStatus::Uploading)
                | (UploadStatus::Idle, UploadStatus::Error)
                | (UploadStatus::Uploading, UploadStatus::Success)
                | (UploadStatus::Uploading, UploadStatus::Error)
        )
    }
}

/// Observable state of one file's upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: u64,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    /// Assigned once, after presigning succeeds
    pub key: Option<String>,
    pub status: UploadStatus,
    /// 0 to 100, never decreases
    pub progress: u8,
    /// Present iff `status` is `Error`
    pub error: Option<String>,
    /// Present iff `status` is `Success`
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl UploadTask {
    fn new(id: u64, file: &UploadFile) -> Self {
        Self {
            id,
            file_name: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.size(),
            key: None,
            status: UploadStatus::Idle,
            progress: 0,
            error: None,
            url: None,
            width: None,
            height: None,
        }
    }

    /// The object key if one was assigned, otherwise the file name
    pub fn identity(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.file_name)
    }
}

pub type TaskCallback = Arc<dyn Fn(&UploadTask) + Send + Sync>;

/// Hooks called when a task finishes
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    pub on_complete: Option<TaskCallback>,
    /// Called for presign and transfer failures, not for validation rejects
    pub on_error: Option<TaskCallback>,
}

type TaskList = Arc<Vec<UploadTask>>;

/// Sequential upload driver
pub struct UploadOrchestrator {
    presign: Arc<dyn PresignClient>,
    transfer: TransferExecutor,
    policy: UploadPolicy,
    callbacks: UploadCallbacks,
    state: Arc<watch::Sender<TaskList>>,
    next_id: AtomicU64,
    cancel: Mutex<CancellationToken>,
}

impl UploadOrchestrator {
    pub fn new(
        presign: Arc<dyn PresignClient>,
        transfer: TransferExecutor,
        policy: UploadPolicy,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            presign,
            transfer,
            policy,
            callbacks: UploadCallbacks::default(),
            state: Arc::new(state),
            next_id: AtomicU64::new(1),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Snapshot of every task
    pub fn tasks(&self) -> TaskList {
        self.state.borrow().clone()
    }

    /// Receive a new snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<TaskList> {
        self.state.subscribe()
    }

    /// Forget every task.
    ///
    /// Transfers already in flight keep running; their later updates are
    /// dropped because the tasks no longer exist.
    pub fn reset(&self) {
        self.state.send_replace(Arc::new(Vec::new()));
        tracing::debug!("Upload tasks reset");
    }

    /// Cancel the in-flight transfer and the rest of the running batches.
    /// Batches started afterwards are unaffected.
    pub fn abort(&self) {
        let mut cancel = self.cancel.lock();
        cancel.cancel();
        *cancel = CancellationToken::new();
        tracing::info!("Uploads aborted");
    }

    /// Run a batch and return its tasks in their final state.
    ///
    /// Files are processed strictly one after another in the given order.
    /// A failing file never stops the batch. Tasks removed by [`reset`]
    /// while the batch runs are not returned.
    ///
    /// [`reset`]: UploadOrchestrator::reset
    #[tracing::instrument(name = "upload.batch", skip_all, fields(upload.files = files.len()))]
    pub async fn upload_files(&self, files: Vec<UploadFile>) -> Vec<UploadTask> {
        let cancel = self.cancel.lock().clone();

        let queue: Vec<(u64, UploadFile)> = files
            .into_iter()
            .map(|file| (self.next_id.fetch_add(1, Ordering::Relaxed), file))
            .collect();

        let new_tasks: Vec<UploadTask> = queue
            .iter()
            .map(|(id, file)| UploadTask::new(*id, file))
            .collect();
        self.state.send_modify(|tasks| {
            let mut next = (**tasks).clone();
            next.extend(new_tasks);
            *tasks = Arc::new(next);
        });

        let ids: Vec<u64> = queue.iter().map(|(id, _)| *id).collect();
        for (id, file) in queue {
            self.process(id, file, &cancel).await;
        }

        self.tasks()
            .iter()
            .filter(|task| ids.contains(&task.id))
            .cloned()
            .collect()
    }

    async fn process(&self, id: u64, file: UploadFile, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.fail(id, &UploadError::Cancelled);
            return;
        }

        if let Err(e) = self.policy.validate(file.size(), &file.content_type) {
            tracing::info!(file = %file.name, reason = %e, "File rejected");
            self.fail(id, &e);
            return;
        }

        if self
            .transition(id, UploadStatus::Uploading, |_| {})
            .is_none()
        {
            return;
        }

        let dimensions = if is_image_type(&file.content_type) {
            safe_extract_image_dimensions(file.data.clone()).await
        } else {
            None
        };

        let request = PresignRequest {
            file_name: file.name.clone(),
            file_type: file.content_type.clone(),
            file_size: file.size(),
            dimensions,
        };
        let target = match self.presign.create_upload(&request).await {
            Ok(target) => target,
            Err(e) => {
                self.fail_and_notify(id, &e);
                return;
            }
        };

        update_task(&self.state, id, |task| {
            if task.key.is_none() {
                task.key = Some(target.key.clone());
            }
        });

        let state = Arc::clone(&self.state);
        let on_progress: ProgressCallback = Arc::new(move |percent: u8| {
            update_task(&state, id, |task| {
                if task.status == UploadStatus::Uploading && percent > task.progress {
                    task.progress = percent.min(100);
                }
            });
        });

        match self
            .transfer
            .upload(&target, &file, on_progress, cancel)
            .await
        {
            Ok(()) => {
                let done = self.transition(id, UploadStatus::Success, |task| {
                    task.progress = 100;
                    task.url = Some(target.public_url.clone());
                    task.width = dimensions.map(|d| d.width);
                    task.height = dimensions.map(|d| d.height);
                });
                if let (Some(task), Some(callback)) = (done, &self.callbacks.on_complete) {
                    callback(&task);
                }
            }
            Err(e) => self.fail_and_notify(id, &e),
        }
    }

    fn transition<F>(&self, id: u64, next: UploadStatus, apply: F) -> Option<UploadTask>
    where
        F: FnOnce(&mut UploadTask),
    {
        let mut illegal = None;
        let updated = update_task(&self.state, id, |task| {
            if task.status.can_transition_to(next) {
                task.status = next;
                apply(task);
            } else {
                illegal = Some(task.status);
            }
        });

        if let Some(from) = illegal {
            tracing::warn!(task = id, from = ?from, to = ?next, "Ignoring illegal status transition");
            return None;
        }
        updated
    }

    fn fail(&self, id: u64, error: &UploadError) -> Option<UploadTask> {
        let reason = error.to_string();
        self.transition(id, UploadStatus::Error, |task| task.error = Some(reason))
    }

    fn fail_and_notify(&self, id: u64, error: &UploadError) {
        let failed = self.fail(id, error);
        if let Some(ref task) = failed {
            tracing::warn!(identity = %task.identity(), reason = %error, "Upload failed");
        }
        if let (Some(task), Some(callback)) = (failed, &self.callbacks.on_error) {
            callback(&task);
        }
    }
}

/// Replace the list with a copy in which task `id` was changed by `apply`.
/// Returns the updated task, or `None` if it no longer exists.
fn update_task<F>(state: &watch::Sender<TaskList>, id: u64, apply: F) -> Option<UploadTask>
where
    F: FnOnce(&mut UploadTask),
{
    let mut updated = None;
    state.send_if_modified(|tasks| {
        let Some(index) = tasks.iter().position(|task| task.id == id) else {
            return false;
        };
        let mut next = (**tasks).clone();
        apply(&mut next[index]);
        if next[index] == tasks[index] {
            return false;
        }
        updated = Some(next[index].clone());
        *tasks = Arc::new(next);
        true
    });

    updated.or_else(|| state.borrow().iter().find(|task| task.id == id).cloned())
}

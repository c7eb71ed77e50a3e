//! Editor attachment operations
//!
//! The per-editor API the host compose surface drives: staging files for
//! upload, removing attachments, and the write-through wiring between the
//! upload coordinator, the ledger, and the save scheduler. Every ledger
//! mutation here recomputes the derived editor status and (except for the
//! smart-link toggle) schedules a debounced draft save.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::backend::NotificationSink;
use crate::config::ComposeConfig;
use crate::save::{SaveOptions, SaveOutcome, SaveScheduler};
use crate::services::helpers::{
    compose_attachment_download_url, compose_cid_url, compose_content_id,
};
use crate::state::EditorStore;
use crate::types::{
    EditorId, SavedAttachment, StagedFile, UnsavedAttachment, UploadId, UploadStatus,
};
use crate::upload::{UploadCoordinator, UploadObserver};

pub type ProgressCallback = Box<dyn Fn(&StagedFile, &UploadId, u8) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&StagedFile, &UploadId, &str) + Send + Sync>;
pub type CompleteCallback = Box<dyn Fn(&StagedFile, &UploadId, &str) + Send + Sync>;
pub type BatchEndCallback = Box<dyn Fn(&[UploadId], &[UploadId]) + Send + Sync>;

/// Invoked once the draft save triggered by a batch resolves, with the
/// content ids of the batch's inline attachments the server confirmed
pub type SaveCompleteCallback = Box<dyn FnOnce(Vec<String>) + Send>;

/// Inline variant of [`SaveCompleteCallback`], resolved to displayable URLs
pub type InlineSaveCompleteCallback = Box<dyn FnOnce(Vec<InlineAttachmentInfo>) + Send>;

/// Optional caller hooks layered on top of the write-through updates
#[derive(Default)]
pub struct UploadCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_complete: Option<CompleteCallback>,
    pub on_batch_end: Option<BatchEndCallback>,
}

/// What a caller needs to render a freshly persisted inline attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachmentInfo {
    pub content_id: Option<String>,
    pub cid_url: Option<String>,
    pub download_url: Option<String>,
}

/// Metadata for reattaching content that was already uploaded out-of-band
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub attachment_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Per-editor attachment operations
pub struct AttachmentService {
    config: ComposeConfig,
    store: Arc<EditorStore>,
    coordinator: UploadCoordinator,
    scheduler: Arc<SaveScheduler>,
    notifier: Arc<dyn NotificationSink>,
}

impl AttachmentService {
    pub fn new(
        config: ComposeConfig,
        store: Arc<EditorStore>,
        coordinator: UploadCoordinator,
        scheduler: Arc<SaveScheduler>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            coordinator,
            scheduler,
            notifier,
        }
    }

    /// Stage files as standard (listed) attachments and start uploading
    ///
    /// Returns the staged ledger entries, one per file, already visible in
    /// the editor's unsaved collection.
    pub async fn add_standard_attachments(
        &self,
        editor_id: &str,
        files: Vec<StagedFile>,
        callbacks: UploadCallbacks,
    ) -> Vec<UnsavedAttachment> {
        self.add_attachments(editor_id, files, false, callbacks, None)
            .await
    }

    /// Stage files as inline attachments and start uploading
    ///
    /// `on_save_complete` fires after the draft save triggered by this
    /// batch resolves, carrying displayable URLs for exactly those inline
    /// attachments the server confirmed. If the editor closed or the save
    /// failed it fires with an empty list.
    pub async fn add_inline_attachments(
        &self,
        editor_id: &str,
        files: Vec<StagedFile>,
        callbacks: UploadCallbacks,
        on_save_complete: Option<InlineSaveCompleteCallback>,
    ) -> Vec<UnsavedAttachment> {
        let wrapped = on_save_complete.map(|callback| {
            let store = self.store.clone();
            let config = self.config.clone();
            let editor_id: EditorId = editor_id.to_string();
            let wrapped: SaveCompleteCallback = Box::new(move |content_ids: Vec<String>| {
                // The ledger lookup is async; resolve it on a task and
                // hand the result to the caller from there.
                tokio::spawn(async move {
                    let info = match store.editor(&editor_id).await {
                        Some(editor) => editor
                            .saved_inline_by_content_ids(&content_ids)
                            .into_iter()
                            .map(|attachment| InlineAttachmentInfo {
                                content_id: attachment.content_id.clone(),
                                cid_url: attachment.content_id.as_deref().map(compose_cid_url),
                                download_url: Some(compose_attachment_download_url(
                                    &config, attachment,
                                )),
                            })
                            .collect(),
                        None => Vec::new(),
                    };
                    callback(info);
                });
            });
            wrapped
        });
        self.add_attachments(editor_id, files, true, callbacks, wrapped)
            .await
    }

    /// Reattach content that was already uploaded out-of-band
    ///
    /// No transfer runs; the entry is staged as already completed and a
    /// draft save is scheduled to commit it.
    pub async fn add_uploaded_attachment(
        &self,
        editor_id: &str,
        file: UploadedFile,
    ) -> UnsavedAttachment {
        let attachment = UnsavedAttachment {
            filename: file.filename,
            content_type: file.content_type,
            size: file.size,
            is_inline: false,
            upload_id: None,
            content_id: None,
            status: UploadStatus::Completed,
            server_attachment_id: Some(file.attachment_id),
            staged_at: Utc::now(),
            cancel: None,
        };
        self.store
            .add_unsaved(editor_id, vec![attachment.clone()])
            .await;
        self.store.recompute_status(editor_id).await;
        self.scheduler.schedule_save(editor_id, SaveOptions::default());
        attachment
    }

    /// Remove an unsaved attachment, aborting its transfer if still running
    ///
    /// A missing upload id is a no-op: the attachment already resolved or
    /// was removed.
    pub async fn remove_unsaved_attachment(&self, editor_id: &str, upload_id: &str) {
        let Some(removed) = self.store.remove_unsaved(editor_id, upload_id).await else {
            debug!("remove_unsaved_attachment: upload {upload_id} already gone");
            return;
        };
        if let Some(cancel) = &removed.cancel {
            cancel.cancel();
        }
        self.store.recompute_status(editor_id).await;
        self.scheduler.schedule_save(editor_id, SaveOptions::default());
    }

    /// Remove a saved attachment by server part name
    pub async fn remove_saved_attachment(&self, editor_id: &str, part_name: &str) {
        if self.store.remove_saved(editor_id, part_name).await.is_none() {
            debug!("remove_saved_attachment: part {part_name} already gone");
            return;
        }
        self.store.recompute_status(editor_id).await;
        self.scheduler.schedule_save(editor_id, SaveOptions::default());
    }

    /// Discard every standard attachment at once, aborting in-flight transfers
    pub async fn remove_standard_attachments(&self, editor_id: &str) {
        let removed = self.store.clear_standard_attachments(editor_id).await;
        for attachment in &removed {
            if let Some(cancel) = &attachment.cancel {
                cancel.cancel();
            }
        }
        self.store.recompute_status(editor_id).await;
        self.scheduler.schedule_save(editor_id, SaveOptions::default());
    }

    /// Flip the smart-link flag on a saved attachment (flag mutation only)
    pub async fn toggle_smart_link(&self, editor_id: &str, part_name: &str) {
        self.store.toggle_smart_link(editor_id, part_name).await;
    }

    /// Whether any standard attachment exists, saved or unsaved
    pub async fn has_standard_attachments(&self, editor_id: &str) -> bool {
        self.store
            .editor(editor_id)
            .await
            .is_some_and(|editor| editor.has_standard_attachments())
    }

    /// Snapshot of the standard unsaved attachments
    pub async fn unsaved_standard_attachments(&self, editor_id: &str) -> Vec<UnsavedAttachment> {
        self.store
            .editor(editor_id)
            .await
            .map(|editor| editor.standard_unsaved().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the standard saved attachments
    pub async fn saved_standard_attachments(&self, editor_id: &str) -> Vec<SavedAttachment> {
        self.store
            .editor(editor_id)
            .await
            .map(|editor| editor.standard_saved().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn add_attachments(
        &self,
        editor_id: &str,
        files: Vec<StagedFile>,
        is_inline: bool,
        callbacks: UploadCallbacks,
        on_save_complete: Option<SaveCompleteCallback>,
    ) -> Vec<UnsavedAttachment> {
        let observer = Arc::new(WriteThroughObserver {
            editor_id: editor_id.to_string(),
            is_inline,
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
            notifier: self.notifier.clone(),
            callbacks,
            on_save_complete: Mutex::new(on_save_complete),
        });

        let batch = self.coordinator.start_uploads(files, observer);

        let attachments: Vec<UnsavedAttachment> = batch
            .handles()
            .iter()
            .map(|handle| UnsavedAttachment {
                filename: handle.file.filename.clone(),
                content_type: handle.file.content_type.clone(),
                size: handle.file.size,
                is_inline,
                content_id: is_inline
                    .then(|| compose_content_id(&handle.upload_id, &self.config.cid_domain)),
                upload_id: Some(handle.upload_id.clone()),
                status: UploadStatus::Running { progress: 0 },
                server_attachment_id: None,
                staged_at: Utc::now(),
                cancel: Some(handle.cancel.clone()),
            })
            .collect();

        // Stage the ledger entries before the transfers may produce events.
        self.store.add_unsaved(editor_id, attachments.clone()).await;
        self.store.recompute_status(editor_id).await;
        batch.begin();

        attachments
    }
}

/// Write-through layer between the coordinator and the ledger
///
/// Every task event updates the ledger first, then the caller's hook.
/// Batch end is the sole trigger for persisting the batch's effect on the
/// draft.
struct WriteThroughObserver {
    editor_id: EditorId,
    is_inline: bool,
    store: Arc<EditorStore>,
    scheduler: Arc<SaveScheduler>,
    notifier: Arc<dyn NotificationSink>,
    callbacks: UploadCallbacks,
    on_save_complete: Mutex<Option<SaveCompleteCallback>>,
}

#[async_trait]
impl UploadObserver for WriteThroughObserver {
    async fn on_progress(&self, file: &StagedFile, upload_id: &UploadId, percent: u8) {
        self.store
            .set_upload_status(
                &self.editor_id,
                upload_id,
                UploadStatus::Running { progress: percent },
            )
            .await;
        if let Some(callback) = &self.callbacks.on_progress {
            callback(file, upload_id, percent);
        }
    }

    async fn on_error(&self, file: &StagedFile, upload_id: &UploadId, reason: &str) {
        let recorded = self
            .store
            .set_upload_status(
                &self.editor_id,
                upload_id,
                UploadStatus::Aborted {
                    reason: reason.to_string(),
                },
            )
            .await;
        // A missing entry means the user already removed the attachment
        // (which cancelled the transfer) or the editor closed; neither
        // warrants a failure notification.
        if recorded {
            self.notifier.notify(&format!(
                "Upload failed for the file \"{}\"",
                file.filename
            ));
        }
        self.store.recompute_status(&self.editor_id).await;
        if let Some(callback) = &self.callbacks.on_error {
            callback(file, upload_id, reason);
        }
    }

    async fn on_complete(&self, file: &StagedFile, upload_id: &UploadId, attachment_id: &str) {
        self.store
            .set_upload_completed(&self.editor_id, upload_id, attachment_id)
            .await;
        self.store.recompute_status(&self.editor_id).await;
        if let Some(callback) = &self.callbacks.on_complete {
            callback(file, upload_id, attachment_id);
        }
    }

    async fn on_batch_end(&self, completed: &[UploadId], failed: &[UploadId]) {
        let on_save_complete = self
            .on_save_complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match self.store.editor(&self.editor_id).await {
            Some(editor) => {
                // Content ids of this batch's confirmed inline uploads;
                // attachments of the other kind are excluded even when
                // they completed in the same batch.
                let content_ids: Vec<String> = editor
                    .unsaved_by_upload_ids(completed)
                    .into_iter()
                    .filter(|a| a.is_inline == self.is_inline)
                    .filter_map(|a| a.content_id.clone())
                    .collect();

                let options = match on_save_complete {
                    Some(callback) => SaveOptions::on_complete(move |outcome| {
                        if outcome == SaveOutcome::Saved {
                            callback(content_ids);
                        } else {
                            // Nothing confirmed.
                            callback(Vec::new());
                        }
                    }),
                    None => SaveOptions::default(),
                };
                self.scheduler.schedule_save(&self.editor_id, options);
            }
            None => {
                debug!(
                    "batch resolved after editor {} closed, skipping save",
                    self.editor_id
                );
                if let Some(callback) = on_save_complete {
                    callback(Vec::new());
                }
            }
        }
        if let Some(callback) = &self.callbacks.on_batch_end {
            callback(completed, failed);
        }
    }
}

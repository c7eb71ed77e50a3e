//! Collaborator interfaces
//!
//! The engine coordinates between a host shell and a mail server but owns
//! neither. The host injects these trait objects at construction time:
//! the file transport streams bytes, the draft persister writes the draft,
//! the notification sink surfaces user-visible messages. All of them are
//! replaceable in tests.

use async_trait::async_trait;

use crate::types::error::Result;
use crate::types::{SavedAttachment, StagedFile, UploadId};
use crate::upload::CancelHandle;

/// Asynchronous file transfer to the mail server
///
/// One call transfers one file. Progress percentages go through the
/// `progress` channel; the implementation should observe `cancel` and
/// abort the transfer as soon as it trips. On success the server-assigned
/// attachment id is returned.
///
/// The coordinator, not the transport, enforces the per-task event
/// ordering guarantees (progress events strictly before the terminal
/// outcome, monotonically non-decreasing percentages).
#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn upload(
        &self,
        file: &StagedFile,
        upload_id: &UploadId,
        progress: flume::Sender<u8>,
        cancel: CancelHandle,
    ) -> Result<String>;
}

/// Draft persistence on the mail server
///
/// Safe to call repeatedly for the same editor. On success the returned
/// list is the server's authoritative view of the saved attachments,
/// which the ledger merges back in.
#[async_trait]
pub trait DraftPersister: Send + Sync {
    async fn save_draft(&self, editor_id: &str) -> Result<Vec<SavedAttachment>>;
}

/// Fire-and-forget user-facing notifications (e.g. a snackbar in the host)
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str);
}

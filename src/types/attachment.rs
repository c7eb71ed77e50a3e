//! Attachment data model
//!
//! Distinguishes attachments staged locally (unsaved, possibly still being
//! transferred) from attachments the server has committed into the
//! persisted draft (saved, addressed by part name).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UploadId;
use crate::upload::CancelHandle;

/// Progress state of a single upload task
///
/// A task moves from `Running` to exactly one of the terminal states.
/// A new upload creates a fresh [`UnsavedAttachment`] instead of
/// resurrecting a terminal one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Transfer in progress, `progress` in 0..=100
    Running { progress: u8 },
    /// Transfer finished, server acknowledged the bytes
    Completed,
    /// Transfer failed or was cancelled
    Aborted { reason: String },
}

impl UploadStatus {
    /// Whether the status is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// A file handed over by the UI for uploading
///
/// Only metadata lives here; the bytes stay with the host, which the
/// file transport collaborator reads from. Zero-byte or odd-typed files
/// are not rejected at this layer - validation is the host's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// An attachment staged locally, not yet confirmed persisted by the server
///
/// Exactly one of these holds at any time: the upload is actively running,
/// the attachment carries a `server_attachment_id` (reattached pre-uploaded
/// content), or the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsavedAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,

    /// Whether the attachment is referenced from within the message body
    pub is_inline: bool,

    /// Upload task id, absent for reattached pre-uploaded content
    pub upload_id: Option<UploadId>,

    /// Content id for inline attachments, derived from the upload id
    pub content_id: Option<String>,

    pub status: UploadStatus,

    /// Server-side id of already-uploaded content being reattached
    pub server_attachment_id: Option<String>,

    /// When the attachment was staged
    pub staged_at: DateTime<Utc>,

    /// Abort handle for the in-flight transfer, owned by the coordinator
    #[serde(skip)]
    pub cancel: Option<CancelHandle>,
}

impl UnsavedAttachment {
    /// Whether this entry matches the given upload id
    pub fn has_upload_id(&self, upload_id: &str) -> bool {
        self.upload_id.as_deref() == Some(upload_id)
    }
}

/// An attachment the server has committed into the persisted draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAttachment {
    /// Id of the draft message owning the part
    pub message_id: String,

    /// Server-assigned structural id within the message
    pub part_name: String,

    pub filename: String,
    pub content_type: String,
    pub size: u64,

    pub is_inline: bool,

    /// Stable content id for inline attachments, used to build cid URLs
    pub content_id: Option<String>,

    /// Marked for large-file ("smart link") handling instead of inline transport
    pub requires_smart_link: bool,
}

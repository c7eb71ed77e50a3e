//! Draft editor model
//!
//! An editor is a draft-in-progress: it owns the unsaved and saved
//! attachment collections. Compose fields (recipients, subject, body)
//! belong to the host view layer and are not modeled here.

use serde::{Deserialize, Serialize};

use crate::types::attachment::{SavedAttachment, UnsavedAttachment};
use crate::types::EditorId;

/// Derived editor-level status
///
/// Never stored independently: recomputed from the attachment collections
/// after every mutation that could affect it (see [`crate::state::status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorStatus {
    /// No pending or failed uploads, draft can be sent
    #[default]
    Ready,
    /// At least one upload still running
    UploadsPending,
    /// At least one upload aborted
    UploadsFailed,
}

/// A draft-in-progress and its attachment collections
///
/// Created when the user opens compose/reply/forward, dropped when the
/// draft is sent, discarded, or the compose surface closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftEditor {
    pub id: EditorId,
    pub unsaved_attachments: Vec<UnsavedAttachment>,
    pub saved_attachments: Vec<SavedAttachment>,
    pub status: EditorStatus,
}

impl DraftEditor {
    pub fn new(id: impl Into<EditorId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Unsaved attachments that are not inline
    pub fn standard_unsaved(&self) -> Vec<&UnsavedAttachment> {
        self.unsaved_attachments
            .iter()
            .filter(|a| !a.is_inline)
            .collect()
    }

    /// Saved attachments that are not inline
    pub fn standard_saved(&self) -> Vec<&SavedAttachment> {
        self.saved_attachments
            .iter()
            .filter(|a| !a.is_inline)
            .collect()
    }

    /// Whether any standard (non-inline) attachment exists, saved or not
    pub fn has_standard_attachments(&self) -> bool {
        self.unsaved_attachments.iter().any(|a| !a.is_inline)
            || self.saved_attachments.iter().any(|a| !a.is_inline)
    }

    /// Unsaved attachments whose upload id is in `upload_ids`
    pub fn unsaved_by_upload_ids(&self, upload_ids: &[String]) -> Vec<&UnsavedAttachment> {
        self.unsaved_attachments
            .iter()
            .filter(|a| {
                a.upload_id
                    .as_ref()
                    .is_some_and(|id| upload_ids.contains(id))
            })
            .collect()
    }

    /// Saved inline attachments whose content id is in `content_ids`
    ///
    /// Membership lookup used after a save to correlate freshly persisted
    /// inline parts back to the content ids staged before the save.
    pub fn saved_inline_by_content_ids(&self, content_ids: &[String]) -> Vec<&SavedAttachment> {
        self.saved_attachments
            .iter()
            .filter(|a| {
                a.is_inline
                    && a.content_id
                        .as_ref()
                        .is_some_and(|cid| content_ids.contains(cid))
            })
            .collect()
    }
}

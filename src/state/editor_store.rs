//! Attachment ledger
//!
//! Authoritative per-editor attachment state. All operations are keyed by
//! editor id and tolerate a missing editor (the compose surface may close
//! while uploads are still resolving) as a logged no-op.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::state::status::compute_status;
use crate::types::{DraftEditor, EditorId, SavedAttachment, UnsavedAttachment, UploadStatus};

/// Ledger of draft editors and their attachment collections
///
/// Interleaved mutations from concurrent upload tasks are safe: each task
/// only ever touches the entry carrying its own upload id.
#[derive(Default)]
pub struct EditorStore {
    editors: RwLock<HashMap<EditorId, DraftEditor>>,
}

impl EditorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an editor entry, replacing any previous one with the same id
    pub async fn open_editor(&self, id: impl Into<EditorId>) {
        let editor = DraftEditor::new(id.into());
        info!("opening editor {}", editor.id);
        self.editors.write().await.insert(editor.id.clone(), editor);
    }

    /// Drop an editor and everything it owns
    pub async fn close_editor(&self, id: &str) {
        if self.editors.write().await.remove(id).is_some() {
            info!("closed editor {id}");
        } else {
            debug!("close_editor: editor {id} not found");
        }
    }

    /// Snapshot of the current editor state, if the editor still exists
    pub async fn editor(&self, id: &str) -> Option<DraftEditor> {
        self.editors.read().await.get(id).cloned()
    }

    /// Append staged attachments to the unsaved collection
    ///
    /// No de-duplication by filename: staging the same name twice is legal.
    pub async fn add_unsaved(&self, id: &str, attachments: Vec<UnsavedAttachment>) {
        let mut editors = self.editors.write().await;
        match editors.get_mut(id) {
            Some(editor) => editor.unsaved_attachments.extend(attachments),
            None => debug!("add_unsaved: editor {id} not found"),
        }
    }

    /// Remove an unsaved attachment by upload id
    ///
    /// Returns the removed entry so the caller can abort its transfer.
    /// A missing id (already resolved or removed) is a no-op.
    pub async fn remove_unsaved(&self, id: &str, upload_id: &str) -> Option<UnsavedAttachment> {
        let mut editors = self.editors.write().await;
        let editor = editors.get_mut(id)?;
        let position = editor
            .unsaved_attachments
            .iter()
            .position(|a| a.has_upload_id(upload_id));
        match position {
            Some(index) => Some(editor.unsaved_attachments.remove(index)),
            None => {
                debug!("remove_unsaved: upload {upload_id} not found in editor {id}");
                None
            }
        }
    }

    /// Remove a saved attachment by server part name
    pub async fn remove_saved(&self, id: &str, part_name: &str) -> Option<SavedAttachment> {
        let mut editors = self.editors.write().await;
        let editor = editors.get_mut(id)?;
        let position = editor
            .saved_attachments
            .iter()
            .position(|a| a.part_name == part_name);
        match position {
            Some(index) => Some(editor.saved_attachments.remove(index)),
            None => {
                debug!("remove_saved: part {part_name} not found in editor {id}");
                None
            }
        }
    }

    /// Remove all standard (non-inline) attachments, saved and unsaved
    ///
    /// Returns the removed unsaved entries so in-flight transfers can be
    /// aborted by the caller.
    pub async fn clear_standard_attachments(&self, id: &str) -> Vec<UnsavedAttachment> {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("clear_standard_attachments: editor {id} not found");
            return Vec::new();
        };
        editor.saved_attachments.retain(|a| a.is_inline);
        let (removed, kept): (Vec<_>, Vec<_>) = editor
            .unsaved_attachments
            .drain(..)
            .partition(|a| !a.is_inline);
        editor.unsaved_attachments = kept;
        removed
    }

    /// Update the upload status of an unsaved attachment
    ///
    /// Refused once the entry reached a terminal status: a finished or
    /// aborted upload never changes again.
    pub async fn set_upload_status(&self, id: &str, upload_id: &str, status: UploadStatus) -> bool {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("set_upload_status: editor {id} not found");
            return false;
        };
        let Some(attachment) = editor
            .unsaved_attachments
            .iter_mut()
            .find(|a| a.has_upload_id(upload_id))
        else {
            debug!("set_upload_status: upload {upload_id} not found in editor {id}");
            return false;
        };
        if attachment.status.is_terminal() {
            warn!("refusing status update for terminal upload {upload_id}");
            return false;
        }
        attachment.status = status;
        true
    }

    /// Mark an upload completed and stamp the server-assigned attachment id
    pub async fn set_upload_completed(
        &self,
        id: &str,
        upload_id: &str,
        server_attachment_id: &str,
    ) -> bool {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("set_upload_completed: editor {id} not found");
            return false;
        };
        let Some(attachment) = editor
            .unsaved_attachments
            .iter_mut()
            .find(|a| a.has_upload_id(upload_id))
        else {
            debug!("set_upload_completed: upload {upload_id} not found in editor {id}");
            return false;
        };
        if attachment.status.is_terminal() {
            warn!("refusing completion for terminal upload {upload_id}");
            return false;
        }
        attachment.status = UploadStatus::Completed;
        attachment.server_attachment_id = Some(server_attachment_id.to_string());
        true
    }

    /// Flip the smart-link flag on a saved attachment
    pub async fn toggle_smart_link(&self, id: &str, part_name: &str) -> bool {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("toggle_smart_link: editor {id} not found");
            return false;
        };
        match editor
            .saved_attachments
            .iter_mut()
            .find(|a| a.part_name == part_name)
        {
            Some(attachment) => {
                attachment.requires_smart_link = !attachment.requires_smart_link;
                true
            }
            None => {
                debug!("toggle_smart_link: part {part_name} not found in editor {id}");
                false
            }
        }
    }

    /// Merge the server's authoritative saved set after a successful save
    ///
    /// The saved collection is replaced wholesale. Unsaved entries whose
    /// upload completed are now represented server-side and are dropped;
    /// running and aborted entries stay untouched.
    pub async fn apply_saved_draft(&self, id: &str, saved: Vec<SavedAttachment>) {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("apply_saved_draft: editor {id} not found");
            return;
        };
        editor.saved_attachments = saved;
        editor
            .unsaved_attachments
            .retain(|a| !a.status.is_completed());
    }

    /// Recompute the derived editor status from the current collections
    pub async fn recompute_status(&self, id: &str) {
        let mut editors = self.editors.write().await;
        let Some(editor) = editors.get_mut(id) else {
            debug!("recompute_status: editor {id} not found");
            return;
        };
        editor.status = compute_status(editor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EditorStatus;
    use chrono::Utc;

    fn unsaved(upload_id: &str, inline: bool) -> UnsavedAttachment {
        UnsavedAttachment {
            filename: format!("{upload_id}.bin"),
            content_type: "application/octet-stream".into(),
            size: 5,
            is_inline: inline,
            upload_id: Some(upload_id.to_string()),
            content_id: inline.then(|| format!("{upload_id}@test")),
            status: UploadStatus::Running { progress: 0 },
            server_attachment_id: None,
            staged_at: Utc::now(),
            cancel: None,
        }
    }

    fn saved(part_name: &str, inline: bool) -> SavedAttachment {
        SavedAttachment {
            message_id: "m1".into(),
            part_name: part_name.to_string(),
            filename: format!("{part_name}.bin"),
            content_type: "application/octet-stream".into(),
            size: 5,
            is_inline: inline,
            content_id: inline.then(|| format!("{part_name}@test")),
            requires_smart_link: false,
        }
    }

    #[tokio::test]
    async fn test_remove_unsaved_missing_is_noop() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store.add_unsaved("e1", vec![unsaved("u1", false)]).await;

        assert!(store.remove_unsaved("e1", "nope").await.is_none());
        assert_eq!(store.editor("e1").await.unwrap().unsaved_attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_no_status_update_after_terminal() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store.add_unsaved("e1", vec![unsaved("u1", false)]).await;

        assert!(store.set_upload_completed("e1", "u1", "att-1").await);
        assert!(
            !store
                .set_upload_status("e1", "u1", UploadStatus::Running { progress: 99 })
                .await
        );
        assert!(!store.set_upload_completed("e1", "u1", "att-2").await);

        let editor = store.editor("e1").await.unwrap();
        assert_eq!(editor.unsaved_attachments[0].status, UploadStatus::Completed);
        assert_eq!(
            editor.unsaved_attachments[0].server_attachment_id.as_deref(),
            Some("att-1")
        );
    }

    #[tokio::test]
    async fn test_duplicate_filenames_are_legal() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        let mut a = unsaved("u1", false);
        let mut b = unsaved("u2", false);
        a.filename = "same.txt".into();
        b.filename = "same.txt".into();
        store.add_unsaved("e1", vec![a, b]).await;

        assert_eq!(store.editor("e1").await.unwrap().unsaved_attachments.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_standard_keeps_inline() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store
            .add_unsaved("e1", vec![unsaved("u1", false), unsaved("u2", true)])
            .await;
        store
            .apply_saved_draft("e1", vec![saved("2", false), saved("3", true)])
            .await;

        let removed = store.clear_standard_attachments("e1").await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].upload_id.as_deref(), Some("u1"));

        let editor = store.editor("e1").await.unwrap();
        assert_eq!(editor.unsaved_attachments.len(), 1);
        assert!(editor.unsaved_attachments[0].is_inline);
        assert_eq!(editor.saved_attachments.len(), 1);
        assert!(editor.saved_attachments[0].is_inline);
    }

    #[tokio::test]
    async fn test_apply_saved_draft_drops_completed_keeps_rest() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store
            .add_unsaved(
                "e1",
                vec![unsaved("u1", false), unsaved("u2", false), unsaved("u3", false)],
            )
            .await;
        store.set_upload_completed("e1", "u1", "att-1").await;
        store
            .set_upload_status(
                "e1",
                "u3",
                UploadStatus::Aborted {
                    reason: "network".into(),
                },
            )
            .await;

        store.apply_saved_draft("e1", vec![saved("2", false)]).await;

        let editor = store.editor("e1").await.unwrap();
        assert_eq!(editor.saved_attachments.len(), 1);
        let remaining: Vec<_> = editor
            .unsaved_attachments
            .iter()
            .filter_map(|a| a.upload_id.as_deref())
            .collect();
        assert_eq!(remaining, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_toggle_smart_link() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store.apply_saved_draft("e1", vec![saved("2", false)]).await;

        assert!(store.toggle_smart_link("e1", "2").await);
        assert!(store.editor("e1").await.unwrap().saved_attachments[0].requires_smart_link);
        assert!(store.toggle_smart_link("e1", "2").await);
        assert!(!store.editor("e1").await.unwrap().saved_attachments[0].requires_smart_link);
        assert!(!store.toggle_smart_link("e1", "9").await);
    }

    #[tokio::test]
    async fn test_recompute_status_tracks_mutations() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store.add_unsaved("e1", vec![unsaved("u1", false)]).await;
        store.recompute_status("e1").await;
        assert_eq!(
            store.editor("e1").await.unwrap().status,
            EditorStatus::UploadsPending
        );

        store
            .set_upload_status(
                "e1",
                "u1",
                UploadStatus::Aborted {
                    reason: "boom".into(),
                },
            )
            .await;
        store.recompute_status("e1").await;
        assert_eq!(
            store.editor("e1").await.unwrap().status,
            EditorStatus::UploadsFailed
        );

        store.remove_unsaved("e1", "u1").await;
        store.recompute_status("e1").await;
        assert_eq!(store.editor("e1").await.unwrap().status, EditorStatus::Ready);
    }

    #[tokio::test]
    async fn test_mutations_on_closed_editor_are_noops() {
        let store = EditorStore::new();
        store.open_editor("e1").await;
        store.close_editor("e1").await;

        store.add_unsaved("e1", vec![unsaved("u1", false)]).await;
        assert!(!store.set_upload_completed("e1", "u1", "att").await);
        assert!(store.editor("e1").await.is_none());
    }
}

//! Editor status aggregation
//!
//! The status is a pure function of the current attachment collections.
//! It is recomputed from scratch after every mutation that can affect it,
//! never patched incrementally, so it cannot drift from the collections.

use crate::types::{DraftEditor, EditorStatus};

/// Derive the editor-level status from its attachment collections
///
/// Any aborted upload outranks pending ones: the UI should surface the
/// failure instead of a spinner.
pub fn compute_status(editor: &DraftEditor) -> EditorStatus {
    if editor
        .unsaved_attachments
        .iter()
        .any(|a| a.status.is_aborted())
    {
        EditorStatus::UploadsFailed
    } else if editor
        .unsaved_attachments
        .iter()
        .any(|a| !a.status.is_terminal())
    {
        EditorStatus::UploadsPending
    } else {
        EditorStatus::Ready
    }
}

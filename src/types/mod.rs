//! Data structures shared across the engine

pub mod attachment;
pub mod editor;
pub mod error;

pub use attachment::{SavedAttachment, StagedFile, UnsavedAttachment, UploadStatus};
pub use editor::{DraftEditor, EditorStatus};

/// Opaque id of a draft editor, assigned by the host when compose opens
pub type EditorId = String;

/// Id of a single upload task, allocated by the upload coordinator
pub type UploadId = String;

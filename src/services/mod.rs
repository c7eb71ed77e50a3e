//! High-level attachment operations
//!
//! The API the host compose surface calls into, built on top of the
//! coordinator, the ledger, and the save scheduler.

mod attachment_service;
pub mod helpers;

pub use attachment_service::{
    AttachmentService, BatchEndCallback, CompleteCallback, ErrorCallback, InlineAttachmentInfo,
    InlineSaveCompleteCallback, ProgressCallback, SaveCompleteCallback, UploadCallbacks,
    UploadedFile,
};

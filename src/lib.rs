//! Draft attachment engine for a mail compose surface
//!
//! Coordinates three long-running concerns behind one facade:
//!
//! - uploading files the user attaches while composing, concurrently and
//!   cancellable, with ordered progress reporting ([`upload`])
//! - the per-editor attachment ledger distinguishing locally staged
//!   attachments from parts the server already persisted ([`state`])
//! - debounced, serialized draft saves that commit completed uploads into
//!   the persisted draft ([`save`])
//!
//! The host injects the transport, persistence, and notification
//! collaborators ([`backend`]); the engine owns everything in between.

pub mod backend;
pub mod config;
pub mod save;
pub mod services;
pub mod state;
pub mod types;
pub mod upload;

use std::sync::Arc;

use crate::backend::{DraftPersister, FileTransport, NotificationSink};
use crate::config::ComposeConfig;
use crate::save::SaveScheduler;
use crate::services::AttachmentService;
use crate::state::EditorStore;
use crate::upload::UploadCoordinator;

/// The assembled engine: one per account/session in the host
///
/// Construction wires the store, the upload coordinator, and the save
/// scheduler together around the injected collaborators. All handles are
/// cheaply cloneable through the contained `Arc`s and safe to share
/// across tasks.
pub struct ComposeEngine {
    store: Arc<EditorStore>,
    scheduler: Arc<SaveScheduler>,
    attachments: AttachmentService,
}

impl ComposeEngine {
    pub fn new(
        config: ComposeConfig,
        transport: Arc<dyn FileTransport>,
        persister: Arc<dyn DraftPersister>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(EditorStore::new());
        let scheduler = Arc::new(SaveScheduler::new(
            store.clone(),
            persister,
            config.save_debounce(),
        ));
        let attachments = AttachmentService::new(
            config,
            store.clone(),
            UploadCoordinator::new(transport),
            scheduler.clone(),
            notifier,
        );
        Self {
            store,
            scheduler,
            attachments,
        }
    }

    /// Attachment operations, keyed by editor id
    pub fn attachments(&self) -> &AttachmentService {
        &self.attachments
    }

    /// Direct access to the attachment ledger
    pub fn store(&self) -> &Arc<EditorStore> {
        &self.store
    }

    /// Create an editor entry for a freshly opened compose surface
    pub async fn open_editor(&self, id: &str) {
        self.store.open_editor(id).await;
    }

    /// Drop an editor once the compose surface closes
    ///
    /// Uploads still in flight keep running to completion but their
    /// ledger updates become no-ops; any pending save is dropped and a
    /// save already in flight resolves as gone.
    pub async fn close_editor(&self, id: &str) {
        self.store.close_editor(id).await;
        self.scheduler.forget_editor(id);
    }
}

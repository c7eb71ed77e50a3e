//! Draft save scheduling
//!
//! Collapses bursts of attachment-state changes into a single outbound
//! save per editor. Explicit single-slot design: each editor has one
//! pending timer (replaced on every schedule, trailing-edge debounce) and
//! an in-flight guard enforcing at most one concurrent save. A request
//! arriving while a save is in flight is re-armed and re-debounced once
//! the save settles. Failed saves are not retried; the ledger keeps the
//! affected attachments as unsaved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::DraftPersister;
use crate::state::EditorStore;
use crate::types::EditorId;

/// How a scheduled save resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The server committed the draft; the ledger has merged its view
    Saved,
    /// Persistence failed; nothing was confirmed, nothing was lost
    Failed,
    /// The editor closed before the save fired
    EditorGone,
}

/// Completion callback for a specific schedule request
pub type SaveCallback = Box<dyn FnOnce(SaveOutcome) + Send>;

/// Per-invocation options for [`SaveScheduler::schedule_save`]
#[derive(Default)]
pub struct SaveOptions {
    /// Invoked when the eventual save resolves. The last scheduled call in
    /// a debounce window wins; its callback (or absence of one) replaces
    /// any earlier one.
    pub on_complete: Option<SaveCallback>,
}

impl SaveOptions {
    pub fn on_complete(callback: impl FnOnce(SaveOutcome) + Send + 'static) -> Self {
        Self {
            on_complete: Some(Box::new(callback)),
        }
    }
}

#[derive(Default)]
struct SaveSlot {
    /// Bumped on every arm; stale timers see a newer generation and exit
    generation: u64,
    on_complete: Option<SaveCallback>,
    in_flight: bool,
    /// A schedule arrived while a save was in flight
    rearm: bool,
}

/// Debounced, serialized draft persistence per editor
pub struct SaveScheduler {
    store: Arc<EditorStore>,
    persister: Arc<dyn DraftPersister>,
    debounce: Duration,
    slots: Mutex<HashMap<EditorId, SaveSlot>>,
}

impl SaveScheduler {
    pub fn new(
        store: Arc<EditorStore>,
        persister: Arc<dyn DraftPersister>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            persister,
            debounce,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Request a draft save, debounced over the configured quiet interval
    ///
    /// Every call resets the pending timer. If a save is already in
    /// flight the request is deferred and re-debounced after it settles.
    pub fn schedule_save(self: &Arc<Self>, editor_id: &str, options: SaveOptions) {
        let generation = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(editor_id.to_string()).or_default();
            slot.on_complete = options.on_complete;
            if slot.in_flight {
                debug!("save for editor {editor_id} deferred: one already in flight");
                slot.rearm = true;
                return;
            }
            slot.generation += 1;
            slot.generation
        };
        self.arm(editor_id.to_string(), generation);
    }

    fn arm(self: &Arc<Self>, editor_id: EditorId, generation: u64) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.debounce).await;
            scheduler.fire(&editor_id, generation).await;
        });
    }

    async fn fire(self: &Arc<Self>, editor_id: &str, generation: u64) {
        let on_complete = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = slots.get_mut(editor_id) else {
                return;
            };
            // A later schedule superseded this timer.
            if slot.generation != generation || slot.in_flight {
                return;
            }
            slot.in_flight = true;
            slot.on_complete.take()
        };

        let outcome = self.run_save(editor_id).await;
        if let Some(callback) = on_complete {
            callback(outcome);
        }

        let rearm = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut rearm = None;
            let mut drop_slot = false;
            if let Some(slot) = slots.get_mut(editor_id) {
                slot.in_flight = false;
                if slot.rearm {
                    slot.rearm = false;
                    slot.generation += 1;
                    rearm = Some(slot.generation);
                } else if outcome == SaveOutcome::EditorGone {
                    // Nothing left to save for and nothing pending.
                    drop_slot = true;
                }
            }
            if drop_slot {
                slots.remove(editor_id);
            }
            rearm
        };
        if let Some(generation) = rearm {
            self.arm(editor_id.to_string(), generation);
        }
    }

    /// Drop the scheduling slot for a closed editor
    ///
    /// Any pending timer sees the missing slot and exits without firing;
    /// a save already in flight settles on its own and resolves as gone.
    pub fn forget_editor(&self, editor_id: &str) {
        if self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(editor_id)
            .is_some()
        {
            debug!("dropped save slot for editor {editor_id}");
        }
    }

    #[cfg(test)]
    fn has_slot(&self, editor_id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(editor_id)
    }

    async fn run_save(&self, editor_id: &str) -> SaveOutcome {
        if self.store.editor(editor_id).await.is_none() {
            debug!("skipping save: editor {editor_id} is gone");
            return SaveOutcome::EditorGone;
        }
        match self.persister.save_draft(editor_id).await {
            Ok(saved) => {
                self.store.apply_saved_draft(editor_id, saved).await;
                self.store.recompute_status(editor_id).await;
                SaveOutcome::Saved
            }
            Err(err) => {
                warn!("draft save failed for editor {editor_id}: {err}");
                SaveOutcome::Failed
            }
        }
    }
}

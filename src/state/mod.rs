//! Engine state management
//!
//! The editor store is the single source of truth for attachment state per
//! editor; every other component reads and writes through it instead of
//! keeping its own copy.

mod editor_store;
pub mod status;

pub use editor_store::EditorStore;

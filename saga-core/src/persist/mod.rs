//! Checkpoints, gallery images and their storage.

mod coordinator;
mod saved;
mod service;

pub use coordinator::{CheckpointOutcome, PersistenceCoordinator};
pub use saved::{GalleryItem, GalleryKind, SaveMetadata, SaveType, SavedGame, SUMMARY_CHARS};
pub use service::{JsonDirStore, MemoryStore, PersistError, PersistenceService};

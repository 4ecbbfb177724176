//! Interactive branching narrative engine.
//!
//! This crate provides:
//! - A session engine that turns reader choices into generated story turns
//! - Lateral model fallback and tolerant parsing of model output
//! - Chapter blueprints with progress tracking and automatic planning
//! - Alternate versions of generated segments
//! - Checkpoints with deduplication and undoable deletion
//!
//! # Quick Start
//!
//! ```ignore
//! use saga_core::{EngineConfig, JsonDirStore, Protagonist, SessionEngine, SessionSetup};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Arc::new(MyBackend::new());
//!     let store = Arc::new(JsonDirStore::new("saga-data"));
//!     let engine = SessionEngine::new(provider, store, EngineConfig::from_env()?);
//!
//!     let setup = SessionSetup::new("gothic horror", Protagonist::new("Ayla", "curious"));
//!     let opening = engine.start(setup).await?;
//!     println!("{}", opening.segment.text);
//!
//!     let turn = engine.advance(&opening.segment.choices[0]).await?;
//!     println!("{}", turn.segment.text);
//!
//!     engine.flush_checkpoints().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fallback;
pub mod generate;
pub mod id;
pub mod normalize;
pub mod persist;
pub mod plot;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod story;
pub mod testing;
pub mod turn;
pub mod versions;

// Re-export for convenience
pub use saga_macros::Schema;

// Primary public API
pub use config::{ConfigError, EngineConfig};
pub use fallback::{BackendExhaustedError, FallbackInvoker, FallbackTable};
pub use id::{CharacterId, ChapterId, EventId, GalleryId, SaveId, SegmentId, SessionId};
pub use normalize::{normalize, parse_response, MalformedResponseError};
pub use persist::{
    CheckpointOutcome, GalleryItem, GalleryKind, JsonDirStore, MemoryStore, PersistError,
    PersistenceCoordinator, PersistenceService, SaveType, SavedGame,
};
pub use plot::{ChapterStatus, ChapterTracker, PlanRequest, PlotChapter};
pub use provider::{ContentProvider, ProviderError};
pub use session::{
    ArtifactFailure, ArtifactTarget, PlanReport, SessionEngine, SessionError, SessionSetup,
    SessionState, TurnReport,
};
pub use story::{
    Archetype, GameContext, MemoryState, Mood, Protagonist, ScheduledEvent, StorySegment,
    SupportingCharacter, WorldSettings,
};
pub use testing::{MockProvider, MockResponse, MockTurn, TestHarness};
pub use versions::{RegenerationMode, VersionDirection};

//! Story data model.
//!
//! ```text
//! GameContext
//!  ├── protagonist, characters (affinity)
//!  ├── history: [StorySegment { versions: [SegmentVersion], current_version_index }]
//!  ├── memory: MemoryState (replaced wholesale each turn)
//!  ├── scheduled_events
//!  └── blueprint: [PlotChapter]
//! ```

mod cast;
mod context;
mod event;
mod memory;
mod segment;

pub use cast::{apply_affinity, Archetype, Protagonist, Skill, SupportingCharacter};
pub use context::{GameContext, WorldSettings};
pub use event::{complete_triggered, EventStatus, ScheduledEvent};
pub use memory::MemoryState;
pub use segment::{Mood, SegmentVersion, StorySegment};

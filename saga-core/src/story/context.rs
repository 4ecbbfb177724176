//! The aggregate game context.

use super::cast::{Protagonist, SupportingCharacter};
use super::event::ScheduledEvent;
use super::memory::MemoryState;
use super::segment::StorySegment;
use crate::id::{SegmentId, SessionId};
use crate::plot::PlotChapter;
use serde::{Deserialize, Serialize};

/// Static world description supplied at setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSettings {
    pub title: String,
    pub setting: String,
    pub tone: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Everything the engine knows about one session.
///
/// The engine holds exactly one of these per session behind an `Arc`
/// and replaces it wholesale on every committed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameContext {
    pub session_id: SessionId,
    #[serde(default)]
    pub story_name: String,
    pub genre: String,
    pub protagonist: Protagonist,
    #[serde(default)]
    pub characters: Vec<SupportingCharacter>,
    #[serde(default)]
    pub world: WorldSettings,
    #[serde(default)]
    pub history: Vec<StorySegment>,
    #[serde(default)]
    pub current_segment_id: Option<SegmentId>,
    #[serde(default)]
    pub memory: MemoryState,
    #[serde(default)]
    pub scheduled_events: Vec<ScheduledEvent>,
    #[serde(default)]
    pub blueprint: Vec<PlotChapter>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub finished_chapters: u32,
}

impl GameContext {
    /// Create an empty context for a new session.
    pub fn new(genre: impl Into<String>, protagonist: Protagonist) -> Self {
        Self {
            session_id: SessionId::new(),
            story_name: String::new(),
            genre: genre.into(),
            protagonist,
            characters: Vec::new(),
            world: WorldSettings::default(),
            history: Vec::new(),
            current_segment_id: None,
            memory: MemoryState::default(),
            scheduled_events: Vec::new(),
            blueprint: Vec::new(),
            turn_count: 0,
            finished_chapters: 0,
        }
    }

    /// The currently active segment.
    pub fn current_segment(&self) -> Option<&StorySegment> {
        let id = self.current_segment_id?;
        self.segment(id)
    }

    /// Look up a segment by ID.
    pub fn segment(&self, id: SegmentId) -> Option<&StorySegment> {
        self.history.iter().find(|s| s.id == id)
    }

    /// Look up a segment mutably by ID.
    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut StorySegment> {
        self.history.iter_mut().find(|s| s.id == id)
    }

    /// Position of a segment in history.
    pub fn segment_index(&self, id: SegmentId) -> Option<usize> {
        self.history.iter().position(|s| s.id == id)
    }

    /// The most recent segment.
    pub fn latest_segment(&self) -> Option<&StorySegment> {
        self.history.last()
    }

    /// The segment before the current one, if any.
    pub fn parent_segment_id(&self) -> Option<SegmentId> {
        let index = self.segment_index(self.current_segment_id?)?;
        index
            .checked_sub(1)
            .and_then(|i| self.history.get(i))
            .map(|s| s.id)
    }

    /// Append a segment and make it current.
    pub fn push_segment(&mut self, segment: StorySegment) {
        self.current_segment_id = Some(segment.id);
        self.history.push(segment);
    }

    /// Find a supporting character by name (case-insensitive).
    pub fn character(&self, name: &str) -> Option<&SupportingCharacter> {
        self.characters.iter().find(|c| c.answers_to(name))
    }
}

//! Checkpoint and gallery records.

use crate::id::{GalleryId, SaveId, SegmentId, SessionId};
use crate::plot::active_chapter;
use crate::story::GameContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters of segment text kept in a checkpoint summary.
pub const SUMMARY_CHARS: usize = 50;

/// Why a checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveType {
    /// Written by the engine after each committed turn.
    Auto,
    /// Requested by the reader.
    Manual,
    /// Written once when a session is created.
    Setup,
}

/// Cheap facts about a checkpoint for listing screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub turn_count: u32,
    /// Sum of the protagonist's skill levels.
    pub skill_level: u32,
}

/// A full snapshot of a session at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    pub id: SaveId,
    pub session_id: SessionId,
    /// Segment that was current when the checkpoint was taken.
    pub story_id: Option<SegmentId>,
    /// Segment before `story_id` in the session.
    pub parent_id: Option<SegmentId>,
    pub timestamp: DateTime<Utc>,

    pub story_name: String,
    pub protagonist_name: String,
    pub genre: String,
    /// Opening characters of the current segment's text.
    pub summary: String,
    pub location: Option<String>,
    pub chapter_title: Option<String>,

    pub context: GameContext,
    pub save_type: SaveType,
    pub metadata: SaveMetadata,
}

impl SavedGame {
    /// Snapshot a context.
    pub fn from_context(ctx: &GameContext, save_type: SaveType) -> Self {
        let current = ctx.current_segment();
        Self {
            id: SaveId::new(),
            session_id: ctx.session_id,
            story_id: ctx.current_segment_id,
            parent_id: ctx.parent_segment_id(),
            timestamp: Utc::now(),
            story_name: ctx.story_name.clone(),
            protagonist_name: ctx.protagonist.name.clone(),
            genre: ctx.genre.clone(),
            summary: current.map(|s| s.excerpt(SUMMARY_CHARS)).unwrap_or_default(),
            location: current.and_then(|s| s.location.clone()),
            chapter_title: active_chapter(&ctx.blueprint).map(|c| c.title.clone()),
            context: ctx.clone(),
            save_type,
            metadata: SaveMetadata {
                turn_count: ctx.turn_count,
                skill_level: ctx.protagonist.skill_level(),
            },
        }
    }
}

/// What a gallery image depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GalleryKind {
    Scene,
    Avatar,
}

/// A generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: GalleryId,
    pub session_id: SessionId,
    pub kind: GalleryKind,
    pub prompt: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl GalleryItem {
    pub fn new(session_id: SessionId, kind: GalleryKind, prompt: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: GalleryId::new(),
            session_id,
            kind,
            prompt: prompt.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::{ChapterTracker, PlotChapter};
    use crate::story::{Protagonist, StorySegment};

    #[test]
    fn test_from_context_denormalizes() {
        let hero = Protagonist::new("Ayla", "curious")
            .with_skill("stealth", 2)
            .with_skill("charm", 4);
        let mut ctx = GameContext::new("gothic", hero);
        ctx.story_name = "The Ashen Vale".into();
        ctx.blueprint = vec![PlotChapter::new("Arrival", 500)];
        ChapterTracker::new(&mut ctx.blueprint).ensure_active();

        ctx.push_segment(StorySegment::new("first", vec![]));
        let mut second = StorySegment::new("x".repeat(80), vec![]);
        second.location = Some("crypt".into());
        second.caused_by = Some("descend".into());
        ctx.push_segment(second);
        ctx.turn_count = 1;

        let saved = SavedGame::from_context(&ctx, SaveType::Manual);
        assert_eq!(saved.summary.chars().count(), SUMMARY_CHARS);
        assert_eq!(saved.story_id, ctx.current_segment_id);
        assert_eq!(saved.parent_id, Some(ctx.history[0].id));
        assert_eq!(saved.location.as_deref(), Some("crypt"));
        assert_eq!(saved.chapter_title.as_deref(), Some("Arrival"));
        assert_eq!(saved.metadata, SaveMetadata { turn_count: 1, skill_level: 6 });
        assert_eq!(saved.context, ctx);
    }

    #[test]
    fn test_setup_snapshot_has_no_story() {
        let ctx = GameContext::new("gothic", Protagonist::new("Ayla", "curious"));
        let saved = SavedGame::from_context(&ctx, SaveType::Setup);
        assert_eq!(saved.story_id, None);
        assert_eq!(saved.parent_id, None);
        assert!(saved.summary.is_empty());
    }

    #[test]
    fn test_saved_game_json_round_trip() {
        let mut ctx = GameContext::new("gothic", Protagonist::new("Ayla", "curious"));
        ctx.push_segment(StorySegment::new("The bell tolls.", vec!["Listen".into()]));
        let saved = SavedGame::from_context(&ctx, SaveType::Auto);

        let json = serde_json::to_string(&saved).unwrap();
        assert!(json.contains("\"saveType\":\"auto\""));
        let back: SavedGame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, saved);
    }
}

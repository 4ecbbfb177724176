//! Story segments and their alternate versions.

use crate::id::{GalleryId, SegmentId};
use crate::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emotional tone of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Schema)]
#[serde(rename_all = "lowercase", from = "String")]
#[schema(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Calm,
    Tense,
    Joyful,
    Melancholic,
    Mysterious,
    Romantic,
    Action,
    Horror,
}

impl Mood {
    /// All moods, in declaration order.
    pub const ALL: [Mood; 8] = [
        Mood::Calm,
        Mood::Tense,
        Mood::Joyful,
        Mood::Melancholic,
        Mood::Mysterious,
        Mood::Romantic,
        Mood::Action,
        Mood::Horror,
    ];

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Tense => "tense",
            Mood::Joyful => "joyful",
            Mood::Melancholic => "melancholic",
            Mood::Mysterious => "mysterious",
            Mood::Romantic => "romantic",
            Mood::Action => "action",
            Mood::Horror => "horror",
        }
    }
}

/// Backends are loose about casing and occasionally invent moods;
/// anything unrecognised falls back to `Calm`.
impl From<String> for Mood {
    fn from(value: String) -> Self {
        let lower = value.trim().to_lowercase();
        Mood::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .unwrap_or_default()
    }
}

/// A snapshot of one rendering of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentVersion {
    pub text: String,
    pub choices: Vec<String>,
    pub visual_prompt: String,
    pub mood: Mood,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One generated unit of story content, corresponding to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySegment {
    pub id: SegmentId,
    pub text: String,
    pub choices: Vec<String>,
    #[serde(default)]
    pub mood: Mood,
    #[serde(default)]
    pub visual_prompt: String,
    #[serde(default)]
    pub triggered_event_id: Option<String>,
    #[serde(default)]
    pub active_character_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// The reader input that produced this segment. Absent for the opening.
    #[serde(default)]
    pub caused_by: Option<String>,
    #[serde(default)]
    pub scene_image: Option<GalleryId>,
    /// Alternate renderings; empty until the segment is first regenerated.
    #[serde(default)]
    pub versions: Vec<SegmentVersion>,
    #[serde(default)]
    pub current_version_index: usize,
}

impl StorySegment {
    /// Create a segment with the given prose and choices.
    pub fn new(text: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            id: SegmentId::new(),
            text: text.into(),
            choices,
            mood: Mood::default(),
            visual_prompt: String::new(),
            triggered_event_id: None,
            active_character_name: None,
            location: None,
            caused_by: None,
            scene_image: None,
            versions: Vec::new(),
            current_version_index: 0,
        }
    }

    /// Whether this is an opening segment (no input caused it).
    pub fn is_opening(&self) -> bool {
        self.caused_by.is_none()
    }

    /// Character count of the prose, used for chapter word tracking.
    pub fn text_length(&self) -> u32 {
        self.text.chars().count() as u32
    }

    /// Snapshot the live fields as a version record.
    pub fn snapshot(&self) -> SegmentVersion {
        SegmentVersion {
            text: self.text.clone(),
            choices: self.choices.clone(),
            visual_prompt: self.visual_prompt.clone(),
            mood: self.mood,
            location: self.location.clone(),
            created_at: Utc::now(),
        }
    }

    /// Overwrite the live fields from a version record.
    pub fn apply_version(&mut self, version: &SegmentVersion) {
        self.text = version.text.clone();
        self.choices = version.choices.clone();
        self.visual_prompt = version.visual_prompt.clone();
        self.mood = version.mood;
        self.location = version.location.clone();
    }

    /// Whether the live fields mirror the active version.
    pub fn is_consistent(&self) -> bool {
        match self.versions.get(self.current_version_index) {
            Some(v) => {
                v.text == self.text
                    && v.choices == self.choices
                    && v.visual_prompt == self.visual_prompt
                    && v.mood == self.mood
                    && v.location == self.location
            }
            None => self.versions.is_empty(),
        }
    }

    /// First `max_chars` characters of the prose.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

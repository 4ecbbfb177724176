//! Structured records returned by the content backend.

use crate::story::{Mood, MemoryState};
use crate::Schema;
use serde::{Deserialize, Serialize};

/// A signed affinity change for one supporting character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "affinity_update", rename_all = "camelCase")]
pub struct AffinityChange {
    /// Name of the character whose disposition changed
    pub character_name: String,
    /// Signed change to add to the character's affinity
    pub change: i32,
}

/// One generated story turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "story_turn", rename_all = "camelCase")]
pub struct TurnResponse {
    /// Narrative prose for this turn
    pub text: String,
    /// Choices offered to the reader next
    pub choices: Vec<String>,
    /// Scene description suitable for illustration
    pub visual_prompt: String,
    /// Emotional tone of the scene
    pub mood: Mood,
    /// Complete replacement for every memory buffer
    pub memory_update: MemoryState,
    /// Title for the story, if one has emerged
    #[serde(default)]
    pub story_name: Option<String>,
    /// Supporting character at the centre of this turn
    #[serde(default)]
    pub active_character_name: Option<String>,
    /// Where the scene takes place
    #[serde(default)]
    pub location: Option<String>,
    /// ID of a scheduled event this turn fulfils
    #[serde(default)]
    pub triggered_event_id: Option<String>,
    /// Affinity changes caused by this turn
    #[serde(default)]
    pub affinity_updates: Option<Vec<AffinityChange>>,
}

impl TurnResponse {
    /// Non-blank optional string, trimmed.
    pub(crate) fn clean(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Response shape for choices-only regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "choice_list", rename_all = "camelCase")]
pub struct ChoiceResponse {
    /// Fresh choices for the latest scene
    pub choices: Vec<String>,
}

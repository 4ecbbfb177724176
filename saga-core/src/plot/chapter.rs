//! Plot chapters and their progress bookkeeping.

use crate::id::ChapterId;
use serde::{Deserialize, Serialize};

/// How quickly a chapter should unfold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Pacing {
    Fast,
    #[default]
    Standard,
    Slow,
}

impl From<String> for Pacing {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fast" => Pacing::Fast,
            "slow" => Pacing::Slow,
            _ => Pacing::Standard,
        }
    }
}

/// Lifecycle of a chapter: `Pending -> Active -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Pending,
    Active,
    Completed,
}

/// Counters advanced once per turn while a chapter is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedStats {
    pub current_word_count: u32,
    pub events_triggered: u32,
    pub interactions_count: u32,
}

/// Floors that must be met (together with the word target) to finish a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionCriteria {
    pub min_key_events: u32,
    pub min_interactions: u32,
}

impl Default for CompletionCriteria {
    fn default() -> Self {
        Self {
            min_key_events: 1,
            min_interactions: 1,
        }
    }
}

/// One planned chapter of the story blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotChapter {
    pub id: ChapterId,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub target_word_count: u32,
    #[serde(default)]
    pub key_events: String,
    #[serde(default)]
    pub key_characters: Vec<String>,
    #[serde(default)]
    pub pacing: Pacing,
    pub status: ChapterStatus,
    #[serde(default)]
    pub tracked_stats: TrackedStats,
    #[serde(default)]
    pub completion_criteria: CompletionCriteria,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl PlotChapter {
    /// Create a pending chapter with default criteria.
    pub fn new(title: impl Into<String>, target_word_count: u32) -> Self {
        Self {
            id: ChapterId::new(),
            title: title.into(),
            summary: String::new(),
            target_word_count,
            key_events: String::new(),
            key_characters: Vec::new(),
            pacing: Pacing::Standard,
            status: ChapterStatus::Pending,
            tracked_stats: TrackedStats::default(),
            completion_criteria: CompletionCriteria::default(),
            prerequisites: Vec::new(),
        }
    }

    /// Set the key characters.
    pub fn with_key_characters(mut self, names: Vec<String>) -> Self {
        self.key_characters = names;
        self
    }

    /// Set the completion criteria.
    pub fn with_criteria(mut self, min_key_events: u32, min_interactions: u32) -> Self {
        self.completion_criteria = CompletionCriteria {
            min_key_events,
            min_interactions,
        };
        self
    }

    /// Whether `name` matches one of the key characters.
    ///
    /// Matching is case-insensitive substring containment in either
    /// direction, so "Mira" matches "Mira the Herbalist" and vice versa.
    pub fn involves(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return false;
        }
        self.key_characters.iter().any(|key| {
            let key = key.trim().to_lowercase();
            !key.is_empty() && (key.contains(&name) || name.contains(&key))
        })
    }

    /// Literal completion check; a criterion of zero is trivially met.
    pub fn is_satisfied(&self) -> bool {
        let stats = &self.tracked_stats;
        stats.current_word_count >= self.target_word_count
            && stats.events_triggered >= self.completion_criteria.min_key_events
            && stats.interactions_count >= self.completion_criteria.min_interactions
    }
}

/// What a single turn contributed toward chapter progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text_length: u32,
    pub triggered_event_id: Option<String>,
    pub active_character_name: Option<String>,
}

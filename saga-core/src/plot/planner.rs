//! Automatic chapter planning.
//!
//! The backend proposes chapters and, optionally, new characters. The raw
//! proposal is then materialized with engine-owned defaults: fresh ids,
//! pending status, zeroed stats and word targets clamped into range.

use super::chapter::{ChapterStatus, CompletionCriteria, Pacing, PlotChapter, TrackedStats};
use super::tracker::ChapterTracker;
use crate::fallback::FallbackInvoker;
use crate::generate::{generate_structured, GenerationError};
use crate::id::ChapterId;
use crate::prompt;
use crate::provider::ContentProvider;
use crate::story::{Archetype, GameContext, SupportingCharacter};
use crate::Schema;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters for a planning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub chapter_count: u32,
    pub min_words: u32,
    pub max_words: u32,
    #[serde(default)]
    pub guidance: Option<String>,
    /// Append to a non-empty blueprint instead of replacing it.
    #[serde(default)]
    pub extend: bool,
}

impl PlanRequest {
    pub fn new(chapter_count: u32, min_words: u32, max_words: u32) -> Self {
        Self {
            chapter_count,
            min_words,
            max_words,
            guidance: None,
            extend: false,
        }
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn extending(mut self) -> Self {
        self.extend = true;
        self
    }

    /// Reject requests that cannot produce a usable plan.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.chapter_count == 0 {
            return Err(PlanError::InvalidRequest(
                "chapter count must be at least 1".into(),
            ));
        }
        if self.min_words > self.max_words {
            return Err(PlanError::InvalidRequest(format!(
                "min words {} exceeds max words {}",
                self.min_words, self.max_words
            )));
        }
        Ok(())
    }
}

/// Errors from chapter planning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid plan request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A chapter as proposed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "planned_chapter", rename_all = "camelCase")]
pub struct PlannedChapter {
    /// Chapter title
    pub title: String,
    /// What happens in the chapter
    pub summary: String,
    /// Desired length of the chapter in characters of prose
    pub target_word_count: i64,
    /// Events that must occur before the chapter ends
    #[serde(default)]
    pub key_events: String,
    /// Names of characters central to the chapter
    #[serde(default)]
    pub key_characters: Vec<String>,
    /// One of fast, standard or slow
    #[serde(default)]
    pub pacing: Option<String>,
    /// Conditions that should hold before the chapter starts
    #[serde(default)]
    pub prerequisites: Option<Vec<String>>,
}

/// A new supporting character proposed alongside the chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "planned_character", rename_all = "camelCase")]
pub struct PlannedCharacter {
    /// Character name
    pub name: String,
    /// Narrative role, e.g. innkeeper or rival
    pub role: String,
    /// Archetype: mentor, ally, rival, trickster, guardian, herald, shapeshifter or shadow
    #[serde(default)]
    pub archetype: Option<String>,
    /// Physical description
    #[serde(default)]
    pub description: Option<String>,
    /// Personality summary
    #[serde(default)]
    pub personality: Option<String>,
}

/// Full planning response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "chapter_plan", rename_all = "camelCase")]
pub struct ChapterPlan {
    /// Chapters in the order they should be played
    pub chapters: Vec<PlannedChapter>,
    /// New supporting characters introduced by the plan
    #[serde(default)]
    pub characters: Option<Vec<PlannedCharacter>>,
}

/// Chapters and characters produced by a plan, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub chapters: Vec<PlotChapter>,
    pub characters: Vec<SupportingCharacter>,
}

impl ChapterPlan {
    /// Turn the backend proposal into engine records.
    ///
    /// At most `request.chapter_count` chapters are kept. Characters whose
    /// name is blank or already present in `existing` are dropped.
    pub fn materialize(
        self,
        request: &PlanRequest,
        existing: &[SupportingCharacter],
        rng: &mut impl Rng,
    ) -> PlanOutcome {
        let chapters = self
            .chapters
            .into_iter()
            .take(request.chapter_count as usize)
            .map(|planned| PlotChapter {
                id: ChapterId::new(),
                title: planned.title.trim().to_string(),
                summary: planned.summary,
                target_word_count: clamp_words(planned.target_word_count, request),
                key_events: planned.key_events,
                key_characters: planned.key_characters,
                pacing: planned.pacing.map(Pacing::from).unwrap_or_default(),
                status: ChapterStatus::Pending,
                tracked_stats: TrackedStats::default(),
                completion_criteria: CompletionCriteria::default(),
                prerequisites: planned.prerequisites.unwrap_or_default(),
            })
            .collect();

        let mut characters: Vec<SupportingCharacter> = Vec::new();
        for planned in self.characters.unwrap_or_default() {
            let name = planned.name.trim();
            if name.is_empty()
                || existing.iter().any(|c| c.answers_to(name))
                || characters.iter().any(|c| c.answers_to(name))
            {
                continue;
            }
            let archetype = planned
                .archetype
                .as_deref()
                .and_then(Archetype::parse)
                .unwrap_or_else(|| Archetype::random(rng));
            let mut character = SupportingCharacter::new(name, planned.role, archetype);
            character.affinity = rng.gen_range(-10..=10);
            character.description = planned.description.unwrap_or_default();
            character.personality = planned.personality.unwrap_or_default();
            characters.push(character);
        }

        PlanOutcome {
            chapters,
            characters,
        }
    }
}

fn clamp_words(target: i64, request: &PlanRequest) -> u32 {
    // The request may be unvalidated, with min above max.
    let low = request.min_words.min(request.max_words);
    let high = request.min_words.max(request.max_words);
    let clamped = target.clamp(i64::from(low), i64::from(high));
    u32::try_from(clamped).unwrap_or(high)
}

/// Merge a plan into the context and activate the next chapter if needed.
///
/// Returns the id of a chapter that became active as a result.
pub fn apply_plan(ctx: &mut GameContext, outcome: PlanOutcome, extend: bool) -> Option<ChapterId> {
    if extend && !ctx.blueprint.is_empty() {
        ctx.blueprint.extend(outcome.chapters);
    } else {
        ctx.blueprint = outcome.chapters;
    }
    ctx.characters.extend(outcome.characters);
    ChapterTracker::new(&mut ctx.blueprint).ensure_active()
}

/// Drives one planning call against the backend.
pub struct ChapterPlanner<'a> {
    provider: &'a dyn ContentProvider,
    invoker: &'a FallbackInvoker,
    model: &'a str,
}

impl<'a> ChapterPlanner<'a> {
    pub fn new(provider: &'a dyn ContentProvider, invoker: &'a FallbackInvoker, model: &'a str) -> Self {
        Self {
            provider,
            invoker,
            model,
        }
    }

    /// Ask the backend for a plan and materialize it.
    pub async fn plan(
        &self,
        ctx: &GameContext,
        request: &PlanRequest,
        rng: &mut (impl Rng + Send),
    ) -> Result<PlanOutcome, PlanError> {
        request.validate()?;
        let prompt = prompt::chapter_plan(ctx, request);
        let plan: ChapterPlan = generate_structured(
            self.provider,
            self.invoker,
            self.model,
            &prompt,
            &ChapterPlan::json_schema(),
        )
        .await?;
        tracing::debug!(
            proposed = plan.chapters.len(),
            requested = request.chapter_count,
            "chapter plan received"
        );
        Ok(plan.materialize(request, &ctx.characters, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::Protagonist;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn planned(title: &str, words: i64, pacing: Option<&str>) -> PlannedChapter {
        PlannedChapter {
            title: title.into(),
            summary: format!("{title} happens"),
            target_word_count: words,
            key_events: String::new(),
            key_characters: vec![],
            pacing: pacing.map(String::from),
            prerequisites: None,
        }
    }

    fn planned_character(name: &str, archetype: Option<&str>) -> PlannedCharacter {
        PlannedCharacter {
            name: name.into(),
            role: "stranger".into(),
            archetype: archetype.map(String::from),
            description: None,
            personality: None,
        }
    }

    #[test]
    fn test_materialize_defaults_and_clamping() {
        let plan = ChapterPlan {
            chapters: vec![
                planned("Short", 10, Some("fast")),
                planned("Long", 90_000, Some("glacial")),
                planned("Negative", -5, None),
                planned("Extra", 500, None),
            ],
            characters: None,
        };
        let request = PlanRequest::new(3, 200, 800);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = plan.materialize(&request, &[], &mut rng);

        assert_eq!(outcome.chapters.len(), 3);
        let words: Vec<u32> = outcome.chapters.iter().map(|c| c.target_word_count).collect();
        assert_eq!(words, vec![200, 800, 200]);
        assert_eq!(outcome.chapters[0].pacing, Pacing::Fast);
        assert_eq!(outcome.chapters[1].pacing, Pacing::Standard);
        assert_eq!(outcome.chapters[2].pacing, Pacing::Standard);
        for chapter in &outcome.chapters {
            assert_eq!(chapter.status, ChapterStatus::Pending);
            assert_eq!(chapter.tracked_stats, TrackedStats::default());
            assert_eq!(chapter.completion_criteria, CompletionCriteria::default());
        }
    }

    #[test]
    fn test_materialize_with_inverted_bounds() {
        let plan = ChapterPlan {
            chapters: vec![planned("Low", 5, None), planned("High", 9_000, None)],
            characters: None,
        };
        let request = PlanRequest::new(2, 800, 200);
        assert!(request.validate().is_err());

        let mut rng = StdRng::seed_from_u64(3);
        let outcome = plan.materialize(&request, &[], &mut rng);
        let words: Vec<u32> = outcome.chapters.iter().map(|c| c.target_word_count).collect();
        assert_eq!(words, vec![200, 800]);
    }

    #[test]
    fn test_materialize_characters() {
        let plan = ChapterPlan {
            chapters: vec![],
            characters: Some(vec![
                planned_character("Vell", Some("Rival")),
                planned_character("Quill", Some("not-an-archetype")),
                planned_character("mira", Some("ally")),
                planned_character("  ", None),
            ]),
        };
        let existing = vec![SupportingCharacter::new("Mira", "herbalist", Archetype::Ally)];
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = plan.materialize(&PlanRequest::new(1, 1, 1), &existing, &mut rng);

        assert_eq!(outcome.characters.len(), 2);
        assert_eq!(outcome.characters[0].archetype, Archetype::Rival);
        assert!(Archetype::CATALOG.contains(&outcome.characters[1].archetype));
        for character in &outcome.characters {
            assert!((-10..=10).contains(&character.affinity));
        }
    }

    #[test]
    fn test_apply_plan_extend_and_replace() {
        let mut ctx = GameContext::new("fantasy", Protagonist::new("Ayla", "curious"));
        let first = PlanOutcome {
            chapters: vec![PlotChapter::new("One", 100), PlotChapter::new("Two", 100)],
            characters: vec![],
        };
        let activated = apply_plan(&mut ctx, first, true);
        assert_eq!(activated, Some(ctx.blueprint[0].id));

        let more = PlanOutcome {
            chapters: vec![PlotChapter::new("Three", 100)],
            characters: vec![SupportingCharacter::new("Vell", "rival", Archetype::Rival)],
        };
        assert_eq!(apply_plan(&mut ctx, more, true), None);
        assert_eq!(ctx.blueprint.len(), 3);
        assert_eq!(ctx.blueprint[0].status, ChapterStatus::Active);
        assert_eq!(ctx.characters.len(), 1);

        let replacement = PlanOutcome {
            chapters: vec![PlotChapter::new("Fresh", 100)],
            characters: vec![],
        };
        let activated = apply_plan(&mut ctx, replacement, false);
        assert_eq!(ctx.blueprint.len(), 1);
        assert_eq!(activated, Some(ctx.blueprint[0].id));
    }

    #[test]
    fn test_validate_request() {
        assert!(PlanRequest::new(0, 1, 2).validate().is_err());
        assert!(PlanRequest::new(2, 300, 200).validate().is_err());
        assert!(PlanRequest::new(2, 200, 200).validate().is_ok());
    }

    #[test]
    fn test_plan_schema() {
        let schema = ChapterPlan::json_schema();
        assert_eq!(schema["properties"]["chapters"]["type"], "array");
        assert_eq!(
            schema["properties"]["chapters"]["items"]["properties"]["targetWordCount"]["type"],
            "integer"
        );
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
    }
}

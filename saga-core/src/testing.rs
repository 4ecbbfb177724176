//! Testing utilities for the narrative engine.
//!
//! This module provides tools for integration testing:
//! - `MockProvider` for deterministic generation without a network backend
//! - `MockResponse` / `MockTurn` builders for scripted backend output
//! - `TestHarness` wiring an engine to an in-memory store
//! - Assertion helpers for verifying story state

use crate::config::EngineConfig;
use crate::fallback::FallbackTable;
use crate::persist::MemoryStore;
use crate::plot::{active_chapter, ChapterPlan, PlannedChapter, PlannedCharacter};
use crate::provider::{ContentProvider, ProviderError};
use crate::session::{SessionEngine, SessionError, SessionSetup, TurnReport};
use crate::story::{GameContext, MemoryState, Mood, Protagonist, StorySegment};
use crate::turn::{AffinityChange, ChoiceResponse, TurnResponse};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A scripted backend answer.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Raw text returned as-is, malformed or not.
    Raw(String),
    /// A provider failure.
    Fail(ProviderError),
}

impl MockResponse {
    /// Raw output, returned verbatim.
    pub fn raw(text: impl Into<String>) -> Self {
        MockResponse::Raw(text.into())
    }

    /// A provider failure.
    pub fn error(error: ProviderError) -> Self {
        MockResponse::Fail(error)
    }

    /// A choices-only answer.
    pub fn choices(choices: &[&str]) -> Self {
        let response = ChoiceResponse {
            choices: choices.iter().map(|c| c.to_string()).collect(),
        };
        Self::json(&response)
    }

    /// A chapter plan. Each chapter is `(title, target words, key characters)`.
    pub fn plan(chapters: &[(&str, i64, &[&str])], characters: &[(&str, &str, Option<&str>)]) -> Self {
        let plan = ChapterPlan {
            chapters: chapters
                .iter()
                .map(|(title, words, keys)| PlannedChapter {
                    title: title.to_string(),
                    summary: format!("{title} unfolds"),
                    target_word_count: *words,
                    key_events: String::new(),
                    key_characters: keys.iter().map(|k| k.to_string()).collect(),
                    pacing: None,
                    prerequisites: None,
                })
                .collect(),
            characters: Some(
                characters
                    .iter()
                    .map(|(name, role, archetype)| PlannedCharacter {
                        name: name.to_string(),
                        role: role.to_string(),
                        archetype: archetype.map(String::from),
                        description: None,
                        personality: None,
                    })
                    .collect(),
            ),
        };
        Self::json(&plan)
    }

    fn json(value: &impl serde::Serialize) -> Self {
        MockResponse::Raw(serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string()))
    }
}

/// Builder for a scripted story turn.
#[derive(Debug, Clone)]
pub struct MockTurn(TurnResponse);

impl MockTurn {
    /// A calm turn with two generic choices.
    pub fn new(text: impl Into<String>) -> Self {
        Self(TurnResponse {
            text: text.into(),
            choices: vec!["Press on".into(), "Turn back".into()],
            visual_prompt: "a quiet scene".into(),
            mood: Mood::Calm,
            memory_update: MemoryState::default(),
            story_name: None,
            active_character_name: None,
            location: None,
            triggered_event_id: None,
            affinity_updates: None,
        })
    }

    /// A turn whose prose is exactly `chars` characters long.
    pub fn of_length(chars: usize) -> Self {
        Self::new("a".repeat(chars))
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.0.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_visual_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.0.visual_prompt = prompt.into();
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.0.mood = mood;
        self
    }

    pub fn with_memory(mut self, memory: MemoryState) -> Self {
        self.0.memory_update = memory;
        self
    }

    pub fn with_story_name(mut self, name: impl Into<String>) -> Self {
        self.0.story_name = Some(name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.0.location = Some(location.into());
        self
    }

    pub fn with_character(mut self, name: impl Into<String>) -> Self {
        self.0.active_character_name = Some(name.into());
        self
    }

    pub fn with_event(mut self, event_id: impl ToString) -> Self {
        self.0.triggered_event_id = Some(event_id.to_string());
        self
    }

    pub fn with_affinity(mut self, name: impl Into<String>, change: i32) -> Self {
        self.0
            .affinity_updates
            .get_or_insert_with(Vec::new)
            .push(AffinityChange {
                character_name: name.into(),
                change,
            });
        self
    }
}

impl From<MockTurn> for MockResponse {
    fn from(turn: MockTurn) -> Self {
        MockResponse::json(&turn.0)
    }
}

/// What kind of call the mock received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Image,
}

/// One recorded call to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub kind: CallKind,
    pub model: String,
    pub prompt: String,
}

/// A content provider that returns scripted responses.
///
/// Text calls consume the queue in order; calls to a failing model fail
/// without consuming anything. Image calls return fixed bytes.
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    failing_models: Mutex<HashSet<String>>,
    fail_images: Mutex<bool>,
    panic_images: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    image_bytes: Vec<u8>,
    calls: Mutex<Vec<MockCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self {
            image_bytes: vec![0x89, b'P', b'N', b'G'],
            ..Self::default()
        }
    }

    /// Add a response to the queue.
    pub fn queue(&self, response: impl Into<MockResponse>) {
        lock(&self.responses).push_back(response.into());
    }

    /// Make every call to `model` fail.
    pub fn fail_model(&self, model: impl Into<String>) {
        lock(&self.failing_models).insert(model.into());
    }

    /// Make every image call fail.
    pub fn fail_images(&self, fail: bool) {
        *lock(&self.fail_images) = fail;
    }

    /// Make every image call panic, as a broken backend might.
    pub fn panic_images(&self, panic: bool) {
        *lock(&self.panic_images) = panic;
    }

    /// Delay every call before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Models tried for text calls, in order.
    pub fn text_models(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.kind == CallKind::Text)
            .map(|c| c.model.clone())
            .collect()
    }

    /// Number of image calls received.
    pub fn image_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.kind == CallKind::Image)
            .count()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    async fn record(&self, kind: CallKind, model: &str, prompt: &str) -> Result<(), ProviderError> {
        lock(&self.calls).push(MockCall {
            kind,
            model: model.to_string(),
            prompt: prompt.to_string(),
        });
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failing_models).contains(model) {
            return Err(ProviderError::Api {
                status: 503,
                message: format!("{model} is unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentProvider for MockProvider {
    async fn generate_structured_text(
        &self,
        model: &str,
        prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<String, ProviderError> {
        self.record(CallKind::Text, model, prompt).await?;
        let next = lock(&self.responses).pop_front();
        match next {
            Some(MockResponse::Raw(text)) => Ok(text),
            Some(MockResponse::Fail(error)) => Err(error),
            None => Err(ProviderError::Empty("no scripted response left".into())),
        }
    }

    async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        self.record(CallKind::Image, model, prompt).await?;
        let panics = *lock(&self.panic_images);
        if panics {
            panic!("image backend crashed on {prompt:?}");
        }
        if *lock(&self.fail_images) {
            return Err(ProviderError::Unsupported("images disabled".into()));
        }
        Ok(self.image_bytes.clone())
    }
}

/// Config used by [`TestHarness::new`]: no images, no fallback chain,
/// short timeouts.
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_text_model("mock-text")
        .with_image_model("mock-image")
        .with_fallback(FallbackTable::new())
        .with_images(false)
        .with_request_timeout(Duration::from_secs(5))
}

/// Test harness for running story scenarios.
pub struct TestHarness {
    /// The scripted backend.
    pub provider: Arc<MockProvider>,
    /// The checkpoint store.
    pub store: Arc<MemoryStore>,
    /// The engine under test.
    pub engine: SessionEngine,
}

impl TestHarness {
    /// Create a harness with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a custom config.
    pub fn with_config(config: EngineConfig) -> Self {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let engine = SessionEngine::new(provider.clone(), store.clone(), config);
        Self {
            provider,
            store,
            engine,
        }
    }

    /// Queue a response.
    pub fn expect(&self, response: impl Into<MockResponse>) -> &Self {
        self.provider.queue(response);
        self
    }

    /// Queue a plain turn.
    pub fn expect_turn(&self, text: impl Into<String>) -> &Self {
        self.expect(MockTurn::new(text))
    }

    /// A setup for Ayla, a curious wanderer in a fantasy story.
    pub fn setup() -> SessionSetup {
        SessionSetup::new("fantasy", Protagonist::new("Ayla", "curious"))
    }

    /// Start with [`setup`](Self::setup) and a scripted opening.
    pub async fn start(&self, opening: impl Into<String>) -> Result<TurnReport, SessionError> {
        self.expect_turn(opening);
        self.engine.start(Self::setup()).await
    }

    /// Advance with a scripted turn.
    pub async fn advance(
        &self,
        choice: &str,
        turn: MockTurn,
    ) -> Result<TurnReport, SessionError> {
        self.expect(turn);
        self.engine.advance(choice).await
    }

    /// The live context.
    ///
    /// # Panics
    ///
    /// Panics if no story has been started.
    #[track_caller]
    pub fn context(&self) -> Arc<GameContext> {
        match self.engine.context() {
            Some(ctx) => ctx,
            None => panic!("no story has been started"),
        }
    }

    /// The current segment.
    #[track_caller]
    pub fn current_segment(&self) -> StorySegment {
        match self.context().current_segment() {
            Some(segment) => segment.clone(),
            None => panic!("story has no current segment"),
        }
    }

    /// Affinity of the named character.
    #[track_caller]
    pub fn affinity(&self, name: &str) -> i32 {
        match self.context().character(name) {
            Some(character) => character.affinity,
            None => panic!("no character named {name}"),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assertion helpers for tests.
pub mod assertions {
    use super::*;
    use crate::plot::ChapterStatus;

    /// Assert that the active chapter has the given title.
    #[track_caller]
    pub fn assert_active_chapter(ctx: &GameContext, title: &str) {
        match active_chapter(&ctx.blueprint) {
            Some(chapter) => assert_eq!(chapter.title, title, "unexpected active chapter"),
            None => panic!("expected chapter {title:?} to be active, but none is"),
        }
    }

    /// Assert that no chapter is active.
    #[track_caller]
    pub fn assert_no_active_chapter(ctx: &GameContext) {
        if let Some(chapter) = active_chapter(&ctx.blueprint) {
            panic!("expected no active chapter, found {:?}", chapter.title);
        }
    }

    /// Assert the status of the chapter with the given title.
    #[track_caller]
    pub fn assert_chapter_status(ctx: &GameContext, title: &str, status: ChapterStatus) {
        match ctx.blueprint.iter().find(|c| c.title == title) {
            Some(chapter) => assert_eq!(chapter.status, status, "chapter {title:?}"),
            None => panic!("no chapter titled {title:?}"),
        }
    }

    /// Assert that a segment's live fields mirror its active version.
    #[track_caller]
    pub fn assert_segment_consistent(segment: &StorySegment) {
        assert!(
            segment.is_consistent(),
            "segment {} is out of sync with version {} of {}",
            segment.id,
            segment.current_version_index,
            segment.versions.len()
        );
    }
}

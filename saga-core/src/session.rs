//! The session engine.
//!
//! A [`SessionEngine`] owns one live [`GameContext`] and drives it forward
//! one generation at a time. Each operation works on a private copy of the
//! context and swaps it in only after every step succeeded, so a failed or
//! cancelled operation leaves the previous context untouched.
//!
//! ```text
//! Idle -> AwaitingOpening -> Playing -> AwaitingTurn -> Playing ...
//!                 \                          \
//!                  +-> Aborted / Failed       +-> Aborted / Failed
//! ```

use crate::config::EngineConfig;
use crate::fallback::{BackendExhaustedError, FallbackInvoker};
use crate::generate::{self, GenerationError};
use crate::id::{ChapterId, CharacterId, EventId, GalleryId, SaveId, SegmentId, SessionId};
use crate::normalize::MalformedResponseError;
use crate::persist::{
    CheckpointOutcome, GalleryItem, GalleryKind, PersistError, PersistenceCoordinator,
    PersistenceService, SaveType, SavedGame,
};
use crate::plot::{
    apply_plan, ChapterPlanner, ChapterTracker, ChapterTransition, PlanError, PlanRequest,
    TurnOutcome,
};
use crate::prompt;
use crate::provider::ContentProvider;
use crate::story::{
    apply_affinity, complete_triggered, GameContext, Protagonist, ScheduledEvent,
    SegmentVersion, StorySegment, SupportingCharacter, WorldSettings,
};
use crate::turn::{ChoiceResponse, TurnResponse};
use crate::versions::{self, RegenerationMode, VersionDirection};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    BackendExhausted(#[from] BackendExhaustedError),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponseError),

    #[error("Segment {segment_id} has no recorded input and cannot be regenerated")]
    RegenerationNotAllowed { segment_id: SegmentId },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),

    #[error("Operation aborted")]
    Aborted,

    #[error("Another operation is already in progress")]
    Busy,

    #[error("No story has been started")]
    NotStarted,

    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentId),
}

impl SessionError {
    /// Whether this error is a user-requested cancellation that callers
    /// can drop silently.
    pub fn is_abort(&self) -> bool {
        matches!(self, SessionError::Aborted)
    }
}

impl From<GenerationError> for SessionError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::Exhausted(e) => SessionError::BackendExhausted(e),
            GenerationError::Malformed(e) => SessionError::MalformedResponse(e),
        }
    }
}

impl From<PlanError> for SessionError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::InvalidRequest(reason) => SessionError::Validation(reason),
            PlanError::Generation(e) => e.into(),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingOpening,
    Playing,
    AwaitingTurn,
    Aborted,
    Failed,
}

/// Everything needed to start a story.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub genre: String,
    pub protagonist: Protagonist,
    pub world: WorldSettings,
    pub characters: Vec<SupportingCharacter>,
    pub story_name: Option<String>,
}

impl SessionSetup {
    pub fn new(genre: impl Into<String>, protagonist: Protagonist) -> Self {
        Self {
            genre: genre.into(),
            protagonist,
            world: WorldSettings::default(),
            characters: Vec::new(),
            story_name: None,
        }
    }

    pub fn with_world(mut self, world: WorldSettings) -> Self {
        self.world = world;
        self
    }

    pub fn with_character(mut self, character: SupportingCharacter) -> Self {
        self.characters.push(character);
        self
    }

    pub fn with_story_name(mut self, name: impl Into<String>) -> Self {
        self.story_name = Some(name.into());
        self
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.protagonist.name.trim().is_empty() {
            return Err(SessionError::Validation("protagonist name is required".into()));
        }
        if self.protagonist.trait_.trim().is_empty() {
            return Err(SessionError::Validation("protagonist trait is required".into()));
        }
        Ok(())
    }
}

/// Which record a secondary image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTarget {
    ProtagonistAvatar,
    SceneImage(SegmentId),
    CharacterAvatar(CharacterId),
}

/// A secondary artifact that could not be produced. The turn still
/// commits; the affected record keeps its previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub target: ArtifactTarget,
    pub reason: String,
}

/// Result of a committed opening or turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// The new segment, including any image produced for it.
    pub segment: StorySegment,
    pub chapter_transition: Option<ChapterTransition>,
    pub completed_event: Option<EventId>,
    pub artifact_failures: Vec<ArtifactFailure>,
}

/// Result of a planning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanReport {
    pub chapters: Vec<ChapterId>,
    pub characters: Vec<CharacterId>,
    /// Chapter that became active because of the plan.
    pub activated: Option<ChapterId>,
}

/// Clears the busy flag when an operation ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An in-flight mutating operation.
struct Operation<'a> {
    _busy: BusyGuard<'a>,
    token: CancellationToken,
}

/// Checkpoint writes spawned after commits, plus failures of writes
/// already reaped.
#[derive(Default)]
struct CheckpointWrites {
    tasks: JoinSet<Result<CheckpointOutcome, PersistError>>,
    failures: VecDeque<PersistError>,
}

/// Failures kept between flushes; older ones are dropped after logging.
const MAX_CHECKPOINT_FAILURES: usize = 32;

impl CheckpointWrites {
    fn record(&mut self, joined: Result<Result<CheckpointOutcome, PersistError>, JoinError>) {
        let error = match joined {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e,
            Err(e) => PersistError::Backend(format!("checkpoint task failed: {e}")),
        };
        if self.failures.len() == MAX_CHECKPOINT_FAILURES {
            self.failures.pop_front();
        }
        self.failures.push_back(error);
    }

    /// Drop finished tasks, keeping only their failures.
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.record(joined);
        }
    }
}

struct ImageJob {
    target: ArtifactTarget,
    kind: GalleryKind,
    prompt: String,
}

/// Drives one story session against a content backend.
pub struct SessionEngine {
    provider: Arc<dyn ContentProvider>,
    persistence: Arc<PersistenceCoordinator>,
    config: EngineConfig,
    invoker: FallbackInvoker,
    context: RwLock<Option<Arc<GameContext>>>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    token: Mutex<Option<CancellationToken>>,
    checkpoints: Mutex<CheckpointWrites>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Race `work` against cancellation.
async fn race<T, E>(
    token: &CancellationToken,
    work: impl Future<Output = Result<T, E>>,
) -> Result<T, SessionError>
where
    SessionError: From<E>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionError::Aborted),
        result = work => result.map_err(SessionError::from),
    }
}

impl SessionEngine {
    /// Create an engine with no story yet.
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        service: Arc<dyn PersistenceService>,
        config: EngineConfig,
    ) -> Self {
        let invoker = FallbackInvoker::new(config.fallback.clone())
            .with_attempt_timeout(config.request_timeout);
        let persistence = Arc::new(PersistenceCoordinator::new(service, config.undo_depth));
        Self {
            provider,
            persistence,
            config,
            invoker,
            context: RwLock::new(None),
            state: Mutex::new(SessionState::Idle),
            busy: AtomicBool::new(false),
            token: Mutex::new(None),
            checkpoints: Mutex::new(CheckpointWrites::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The live context, if a story has been started or resumed.
    pub fn context(&self) -> Option<Arc<GameContext>> {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Whether a mutating operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Cancel the in-flight operation, if any. Its results are discarded.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.token).as_ref() {
            token.cancel();
        }
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn begin(&self) -> Result<Operation<'_>, SessionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        let token = CancellationToken::new();
        *lock(&self.token) = Some(token.clone());
        Ok(Operation {
            _busy: BusyGuard(&self.busy),
            token,
        })
    }

    fn commit(&self, ctx: GameContext) -> Arc<GameContext> {
        let ctx = Arc::new(ctx);
        *self.context.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        ctx
    }

    /// The live context, which must have at least one segment.
    fn playing_context(&self) -> Result<Arc<GameContext>, SessionError> {
        match self.context() {
            Some(ctx) if ctx.current_segment().is_some() => Ok(ctx),
            _ => Err(SessionError::NotStarted),
        }
    }

    /// Record the outcome of a primary generation step.
    fn settle<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        match &result {
            Ok(_) => self.set_state(SessionState::Playing),
            Err(e) if e.is_abort() => {
                tracing::debug!("operation aborted");
                self.set_state(SessionState::Aborted);
            }
            Err(e) => {
                tracing::warn!(error = %e, "operation failed");
                self.set_state(SessionState::Failed);
            }
        }
        result
    }

    /// Start a new story and generate its opening.
    pub async fn start(&self, setup: SessionSetup) -> Result<TurnReport, SessionError> {
        setup.validate()?;
        let op = self.begin()?;

        let mut ctx = GameContext::new(setup.genre, setup.protagonist);
        ctx.world = setup.world;
        ctx.characters = setup.characters;
        if let Some(name) = setup.story_name {
            ctx.story_name = name;
        }
        tracing::info!(session = %ctx.session_id, genre = %ctx.genre, "starting session");

        self.set_state(SessionState::AwaitingOpening);
        self.spawn_checkpoint(Arc::new(ctx.clone()), SaveType::Setup);

        let result = self.run_opening(&op, ctx).await;
        self.settle(result)
    }

    async fn run_opening(
        &self,
        op: &Operation<'_>,
        mut ctx: GameContext,
    ) -> Result<TurnReport, SessionError> {
        let prompt = prompt::opening(&ctx);
        let response: TurnResponse = self.generate_turn(&op.token, &prompt).await?;

        let (segment_id, chapter_transition, completed_event) =
            apply_response(&mut ctx, response, None);

        let jobs = self.image_jobs(&ctx, segment_id, true);
        let artifact_failures = self.run_artifacts(&op.token, &mut ctx, jobs).await;

        self.finish(op, ctx, segment_id, chapter_transition, completed_event, artifact_failures)
    }

    /// Replace the live context with a saved snapshot.
    ///
    /// A snapshot taken before the opening (a setup checkpoint) leaves the
    /// session in [`SessionState::AwaitingOpening`]; call
    /// [`open`](Self::open) to generate it.
    pub fn resume(&self, saved: SavedGame) -> Result<Arc<GameContext>, SessionError> {
        let _op = self.begin()?;
        let playing = saved.context.current_segment().is_some();
        tracing::info!(session = %saved.session_id, save = %saved.id, "resuming session");
        let ctx = self.commit(saved.context);
        self.set_state(if playing {
            SessionState::Playing
        } else {
            SessionState::AwaitingOpening
        });
        Ok(ctx)
    }

    /// Generate the opening of a resumed session that has no segments yet.
    pub async fn open(&self) -> Result<TurnReport, SessionError> {
        let op = self.begin()?;
        let base = self.context().ok_or(SessionError::NotStarted)?;
        if base.current_segment().is_some() {
            return Err(SessionError::Validation("story has already opened".into()));
        }
        tracing::info!(session = %base.session_id, "opening resumed session");

        self.set_state(SessionState::AwaitingOpening);
        let result = self.run_opening(&op, (*base).clone()).await;
        self.settle(result)
    }

    /// Continue the story with the reader's choice.
    pub async fn advance(&self, choice: &str) -> Result<TurnReport, SessionError> {
        let choice = choice.trim();
        if choice.is_empty() {
            return Err(SessionError::Validation("choice must not be blank".into()));
        }
        let op = self.begin()?;
        let base = self.playing_context()?;

        self.set_state(SessionState::AwaitingTurn);
        let result = self.run_turn(&op, &base, choice).await;
        self.settle(result)
    }

    async fn run_turn(
        &self,
        op: &Operation<'_>,
        base: &GameContext,
        choice: &str,
    ) -> Result<TurnReport, SessionError> {
        let prompt = prompt::next_turn(base, &base.history, choice, self.config.history_window);
        let response: TurnResponse = self.generate_turn(&op.token, &prompt).await?;

        let mut ctx = base.clone();
        ctx.turn_count += 1;
        let (segment_id, chapter_transition, completed_event) =
            apply_response(&mut ctx, response, Some(choice.to_string()));

        let jobs = self.image_jobs(&ctx, segment_id, false);
        let artifact_failures = self.run_artifacts(&op.token, &mut ctx, jobs).await;

        self.finish(op, ctx, segment_id, chapter_transition, completed_event, artifact_failures)
    }

    /// Commit a generated turn and queue its auto checkpoint.
    fn finish(
        &self,
        op: &Operation<'_>,
        ctx: GameContext,
        segment_id: SegmentId,
        chapter_transition: Option<ChapterTransition>,
        completed_event: Option<EventId>,
        artifact_failures: Vec<ArtifactFailure>,
    ) -> Result<TurnReport, SessionError> {
        if op.token.is_cancelled() {
            return Err(SessionError::Aborted);
        }
        let segment = ctx
            .segment(segment_id)
            .cloned()
            .ok_or(SessionError::UnknownSegment(segment_id))?;
        let ctx = self.commit(ctx);
        if self.config.auto_checkpoint {
            self.spawn_checkpoint(ctx, SaveType::Auto);
        }
        Ok(TurnReport {
            segment,
            chapter_transition,
            completed_event,
            artifact_failures,
        })
    }

    async fn generate_turn(
        &self,
        token: &CancellationToken,
        prompt: &str,
    ) -> Result<TurnResponse, SessionError> {
        let schema = TurnResponse::json_schema();
        race(
            token,
            generate::generate_structured(
                self.provider.as_ref(),
                &self.invoker,
                &self.config.text_model,
                prompt,
                &schema,
            ),
        )
        .await
    }

    /// Generate a new rendering of a segment.
    ///
    /// Versions accumulate on the segment; use
    /// [`switch_version`](Self::switch_version) to move between them.
    pub async fn regenerate(
        &self,
        segment_id: SegmentId,
        mode: RegenerationMode,
    ) -> Result<StorySegment, SessionError> {
        let op = self.begin()?;
        let base = self.playing_context()?;

        let index = base
            .segment_index(segment_id)
            .ok_or(SessionError::UnknownSegment(segment_id))?;
        let segment = &base.history[index];
        let caused_by = segment
            .caused_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if index > 0 && caused_by.is_none() {
            return Err(SessionError::RegenerationNotAllowed { segment_id });
        }
        let is_latest = index + 1 == base.history.len();
        if mode == RegenerationMode::Choices && !is_latest {
            return Err(SessionError::Validation(
                "only the latest segment can have its choices regenerated".into(),
            ));
        }

        let window = self.config.history_window;
        let mut ctx = (*base).clone();
        let version = match mode {
            RegenerationMode::Choices => {
                let prompt = prompt::choices(&base, window);
                let schema = ChoiceResponse::json_schema();
                let response: ChoiceResponse = race(
                    &op.token,
                    generate::generate_structured(
                        self.provider.as_ref(),
                        &self.invoker,
                        &self.config.text_model,
                        &prompt,
                        &schema,
                    ),
                )
                .await?;
                SegmentVersion {
                    choices: response.choices,
                    created_at: Utc::now(),
                    ..segment.snapshot()
                }
            }
            RegenerationMode::Full | RegenerationMode::Text => {
                let prompt = match caused_by {
                    Some(choice) => {
                        prompt::next_turn(&base, &base.history[..index], choice, window)
                    }
                    None => prompt::opening(&base),
                };
                let response = self.generate_turn(&op.token, &prompt).await?;
                if is_latest {
                    ctx.memory = response.memory_update.clone();
                }
                let location = TurnResponse::clean(&response.location);
                if mode == RegenerationMode::Full {
                    SegmentVersion {
                        text: response.text,
                        choices: response.choices,
                        visual_prompt: response.visual_prompt,
                        mood: response.mood,
                        location,
                        created_at: Utc::now(),
                    }
                } else {
                    let choices = if response.choices.is_empty() {
                        segment.choices.clone()
                    } else {
                        response.choices
                    };
                    SegmentVersion {
                        text: response.text,
                        choices,
                        visual_prompt: segment.visual_prompt.clone(),
                        mood: response.mood,
                        location,
                        created_at: Utc::now(),
                    }
                }
            }
        };

        if op.token.is_cancelled() {
            return Err(SessionError::Aborted);
        }
        let target = ctx
            .segment_mut(segment_id)
            .ok_or(SessionError::UnknownSegment(segment_id))?;
        versions::record_regeneration(target, version);
        let regenerated = target.clone();
        tracing::debug!(
            segment = %segment_id,
            ?mode,
            versions = regenerated.versions.len(),
            "segment regenerated"
        );
        self.commit(ctx);
        Ok(regenerated)
    }

    /// Show the previous or next rendering of a segment.
    ///
    /// Returns false when the segment has fewer than two versions.
    pub fn switch_version(
        &self,
        segment_id: SegmentId,
        direction: VersionDirection,
    ) -> Result<bool, SessionError> {
        let _op = self.begin()?;
        let base = self.playing_context()?;
        let mut ctx = (*base).clone();
        let segment = ctx
            .segment_mut(segment_id)
            .ok_or(SessionError::UnknownSegment(segment_id))?;
        if !versions::switch_version(segment, direction) {
            return Ok(false);
        }
        self.commit(ctx);
        Ok(true)
    }

    /// Ask the backend for new chapters and characters.
    pub async fn plan_chapters(&self, request: PlanRequest) -> Result<PlanReport, SessionError> {
        request.validate()?;
        let op = self.begin()?;
        let base = self.context().ok_or(SessionError::NotStarted)?;

        let planner = ChapterPlanner::new(
            self.provider.as_ref(),
            &self.invoker,
            &self.config.text_model,
        );
        let mut rng = StdRng::from_entropy();
        let outcome = race(&op.token, planner.plan(&base, &request, &mut rng)).await?;

        let report_chapters = outcome.chapters.iter().map(|c| c.id).collect();
        let report_characters = outcome.characters.iter().map(|c| c.id).collect();
        let mut ctx = (*base).clone();
        let activated = apply_plan(&mut ctx, outcome, request.extend);

        if op.token.is_cancelled() {
            return Err(SessionError::Aborted);
        }
        self.commit(ctx);
        Ok(PlanReport {
            chapters: report_chapters,
            characters: report_characters,
            activated,
        })
    }

    /// Add a pending event the story should work towards.
    pub fn schedule_event(&self, description: &str) -> Result<EventId, SessionError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SessionError::Validation("event description must not be blank".into()));
        }
        let _op = self.begin()?;
        let base = self.context().ok_or(SessionError::NotStarted)?;
        let mut ctx = (*base).clone();
        let event = ScheduledEvent::new(description, ctx.turn_count);
        let id = event.id;
        ctx.scheduled_events.push(event);
        self.commit(ctx);
        Ok(id)
    }

    /// Save a checkpoint of the current segment on request.
    pub async fn save_manual(&self) -> Result<CheckpointOutcome, SessionError> {
        let ctx = self.playing_context()?;
        Ok(self.persistence.checkpoint(&ctx, SaveType::Manual).await?)
    }

    /// Checkpoints of the live session, newest first.
    pub async fn checkpoints(&self) -> Result<Vec<SavedGame>, SessionError> {
        let session = self.session_id()?;
        Ok(self.persistence.list(session).await?)
    }

    pub async fn delete_checkpoint(&self, id: SaveId) -> Result<SavedGame, SessionError> {
        Ok(self.persistence.delete(id).await?)
    }

    /// Delete every checkpoint of the live session as one undoable step.
    pub async fn delete_session_checkpoints(&self) -> Result<usize, SessionError> {
        let session = self.session_id()?;
        Ok(self.persistence.delete_session(session).await?)
    }

    /// Restore the most recent deletion.
    pub async fn undo_delete(&self) -> Result<Vec<SavedGame>, SessionError> {
        Ok(self.persistence.undo().await?)
    }

    /// Images generated in the live session.
    pub async fn gallery(&self) -> Result<Vec<GalleryItem>, SessionError> {
        let session = self.session_id()?;
        Ok(self.persistence.gallery(session).await?)
    }

    /// Wait for queued checkpoint writes and return the failures seen
    /// since the last flush.
    ///
    /// Dropping the engine aborts writes that are still running.
    pub async fn flush_checkpoints(&self) -> Vec<PersistError> {
        let mut writes = std::mem::take(&mut *lock(&self.checkpoints));
        while let Some(joined) = writes.tasks.join_next().await {
            writes.record(joined);
        }
        writes.failures.into()
    }

    /// Checkpoint writes still running.
    pub fn pending_checkpoints(&self) -> usize {
        let mut writes = lock(&self.checkpoints);
        writes.reap();
        writes.tasks.len()
    }

    fn session_id(&self) -> Result<SessionId, SessionError> {
        self.context()
            .map(|ctx| ctx.session_id)
            .ok_or(SessionError::NotStarted)
    }

    fn spawn_checkpoint(&self, ctx: Arc<GameContext>, save_type: SaveType) {
        let persistence = self.persistence.clone();
        let mut writes = lock(&self.checkpoints);
        writes.reap();
        writes.tasks.spawn(async move {
            let result = persistence.checkpoint(&ctx, save_type).await;
            if let Err(e) = &result {
                tracing::warn!(session = %ctx.session_id, ?save_type, error = %e, "checkpoint write failed");
            }
            result
        });
    }

    /// Images to produce after a segment is generated.
    fn image_jobs(
        &self,
        ctx: &GameContext,
        segment_id: SegmentId,
        include_protagonist: bool,
    ) -> Vec<ImageJob> {
        if !self.config.generate_images {
            return Vec::new();
        }
        let mut jobs = Vec::new();

        let hero = &ctx.protagonist;
        if include_protagonist && hero.avatar.is_none() {
            let look = if hero.description.is_empty() {
                &hero.trait_
            } else {
                &hero.description
            };
            jobs.push(ImageJob {
                target: ArtifactTarget::ProtagonistAvatar,
                kind: GalleryKind::Avatar,
                prompt: prompt::avatar(&hero.name, look, &ctx.genre),
            });
        }

        if let Some(segment) = ctx.segment(segment_id) {
            if !segment.visual_prompt.trim().is_empty() {
                jobs.push(ImageJob {
                    target: ArtifactTarget::SceneImage(segment_id),
                    kind: GalleryKind::Scene,
                    prompt: prompt::scene(&segment.visual_prompt, segment.mood, &ctx.genre),
                });
            }
        }

        for character in ctx.characters.iter().filter(|c| c.avatar.is_none()) {
            let look = if character.description.is_empty() {
                &character.role
            } else {
                &character.description
            };
            jobs.push(ImageJob {
                target: ArtifactTarget::CharacterAvatar(character.id),
                kind: GalleryKind::Avatar,
                prompt: prompt::avatar(&character.name, look, &ctx.genre),
            });
        }

        jobs
    }

    /// Run image jobs concurrently and attach the results to `ctx`.
    async fn run_artifacts(
        &self,
        token: &CancellationToken,
        ctx: &mut GameContext,
        jobs: Vec<ImageJob>,
    ) -> Vec<ArtifactFailure> {
        let mut tasks = JoinSet::new();
        for job in jobs {
            let provider = self.provider.clone();
            let persistence = self.persistence.clone();
            let invoker = self.invoker.clone();
            let model = self.config.image_model.clone();
            let token = token.clone();
            let session = ctx.session_id;
            let target = job.target;
            let task = async move {
                let work = async {
                    let bytes =
                        generate::generate_image(provider.as_ref(), &invoker, &model, &job.prompt)
                            .await
                            .map_err(|e| e.to_string())?;
                    persistence
                        .record_image(session, job.kind, &job.prompt, bytes)
                        .await
                        .map(|item| item.id)
                        .map_err(|e| e.to_string())
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err("aborted".to_string()),
                    result = work => result,
                }
            };
            // A panic in the inner task is reported against its target.
            tasks.spawn(async move {
                let result: Result<GalleryId, String> = match tokio::spawn(task).await {
                    Ok(result) => result,
                    Err(e) => Err(format!("artifact task failed: {e}")),
                };
                (target, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (target, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "artifact task ended unexpectedly");
                    continue;
                }
            };
            match result {
                Ok(image) => attach_image(ctx, target, image),
                Err(reason) => {
                    tracing::warn!(?target, %reason, "secondary artifact failed");
                    failures.push(ArtifactFailure { target, reason });
                }
            }
        }
        failures
    }
}

fn attach_image(ctx: &mut GameContext, target: ArtifactTarget, image: GalleryId) {
    match target {
        ArtifactTarget::ProtagonistAvatar => ctx.protagonist.avatar = Some(image),
        ArtifactTarget::SceneImage(id) => {
            if let Some(segment) = ctx.segment_mut(id) {
                segment.scene_image = Some(image);
            }
        }
        ArtifactTarget::CharacterAvatar(id) => {
            if let Some(character) = ctx.characters.iter_mut().find(|c| c.id == id) {
                character.avatar = Some(image);
            }
        }
    }
}

/// Fold a generated turn into the context.
fn apply_response(
    ctx: &mut GameContext,
    response: TurnResponse,
    caused_by: Option<String>,
) -> (SegmentId, Option<ChapterTransition>, Option<EventId>) {
    let mut segment = StorySegment::new(response.text, response.choices);
    segment.mood = response.mood;
    segment.visual_prompt = response.visual_prompt;
    segment.location = TurnResponse::clean(&response.location);
    segment.active_character_name = TurnResponse::clean(&response.active_character_name);
    segment.triggered_event_id = TurnResponse::clean(&response.triggered_event_id);
    segment.caused_by = caused_by;

    ctx.memory = response.memory_update;

    for update in response.affinity_updates.unwrap_or_default() {
        if !apply_affinity(&mut ctx.characters, &update.character_name, update.change) {
            tracing::debug!(character = %update.character_name, "affinity update for unknown character");
        }
    }

    let completed_event = segment
        .triggered_event_id
        .as_deref()
        .and_then(|id| complete_triggered(&mut ctx.scheduled_events, id, ctx.turn_count));

    if let Some(name) = TurnResponse::clean(&response.story_name) {
        ctx.story_name = name;
    }

    let outcome = TurnOutcome {
        text_length: segment.text_length(),
        triggered_event_id: segment.triggered_event_id.clone(),
        active_character_name: segment.active_character_name.clone(),
    };
    let segment_id = segment.id;
    ctx.push_segment(segment);

    let transition = ChapterTracker::new(&mut ctx.blueprint).apply_turn(&outcome);
    if transition.is_some() {
        ctx.finished_chapters += 1;
    }

    (segment_id, transition, completed_event)
}

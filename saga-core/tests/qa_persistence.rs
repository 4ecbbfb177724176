//! QA tests for checkpoints, deletion and resume.
//!
//! Run with: `cargo test -p saga-core --test qa_persistence`

use saga_core::testing::{test_config, MockProvider};
use saga_core::{
    CheckpointOutcome, JsonDirStore, MockTurn, PersistenceService, SaveType, SessionEngine,
    SessionError, SessionState, TestHarness,
};
use std::sync::Arc;
use tempfile::TempDir;

fn count(games: &[saga_core::SavedGame], save_type: SaveType) -> usize {
    games.iter().filter(|g| g.save_type == save_type).count()
}

// =============================================================================
// TEST 1: One setup checkpoint, then one auto checkpoint per committed turn
// =============================================================================

#[tokio::test]
async fn test_auto_checkpoints_per_turn() {
    let h = TestHarness::new();
    h.start("The archive doors creak open.").await.expect("opening");
    h.advance("Enter", MockTurn::new("Dust everywhere.")).await.expect("turn");
    h.advance("Search the shelves", MockTurn::new("A ledger falls."))
        .await
        .expect("turn");

    let errors = h.engine.flush_checkpoints().await;
    assert!(errors.is_empty(), "checkpoint errors: {errors:?}");

    let games = h.engine.checkpoints().await.expect("list");
    assert_eq!(games.len(), 4);
    assert_eq!(count(&games, SaveType::Setup), 1);
    assert_eq!(count(&games, SaveType::Auto), 3);

    // Newest first, and every auto checkpoint points at a distinct segment.
    assert!(games.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    let mut stories: Vec<_> = games
        .iter()
        .filter(|g| g.save_type == SaveType::Auto)
        .map(|g| g.story_id)
        .collect();
    stories.sort();
    stories.dedup();
    assert_eq!(stories.len(), 3);

    let latest = &h.context();
    let newest_auto = games
        .iter()
        .find(|g| g.story_id == latest.current_segment_id)
        .expect("checkpoint for the current segment");
    assert_eq!(newest_auto.summary, "A ledger falls.");
    assert_eq!(newest_auto.metadata.turn_count, 2);
    assert_eq!(newest_auto.parent_id, Some(latest.history[1].id));
}

// =============================================================================
// TEST 2: A manual save of an already checkpointed segment writes nothing
// =============================================================================

#[tokio::test]
async fn test_manual_save_dedupes() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    h.engine.flush_checkpoints().await;

    let outcome = h.engine.save_manual().await.expect("save");
    assert_eq!(outcome, CheckpointOutcome::AlreadySaved);
    assert_eq!(h.store.len().await, 2);

    let h = TestHarness::with_config(test_config().with_auto_checkpoint(false));
    h.start("Opening").await.expect("opening");
    h.engine.flush_checkpoints().await;

    let first = h.engine.save_manual().await.expect("save");
    let second = h.engine.save_manual().await.expect("save");
    assert!(first.is_saved());
    assert_eq!(second, CheckpointOutcome::AlreadySaved);
    assert_eq!(h.store.len().await, 2);
}

// =============================================================================
// TEST 3: Deleting and undoing restores the exact record
// =============================================================================

#[tokio::test]
async fn test_delete_and_undo() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    h.advance("Go", MockTurn::new("Onward.")).await.expect("turn");
    h.engine.flush_checkpoints().await;

    let games = h.engine.checkpoints().await.expect("list");
    let victim = games[0].clone();

    let deleted = h.engine.delete_checkpoint(victim.id).await.expect("delete");
    assert_eq!(deleted, victim);
    assert_eq!(h.engine.checkpoints().await.expect("list").len(), games.len() - 1);

    let restored = h.engine.undo_delete().await.expect("undo");
    assert_eq!(restored, vec![victim.clone()]);
    let after = h.engine.checkpoints().await.expect("list");
    assert!(after.contains(&victim));
    assert_eq!(after.len(), games.len());

    // Whole-session deletion is a single undo step.
    let removed = h.engine.delete_session_checkpoints().await.expect("delete all");
    assert_eq!(removed, games.len());
    assert!(h.engine.checkpoints().await.expect("list").is_empty());
    assert_eq!(h.engine.undo_delete().await.expect("undo").len(), games.len());
    let by_id = |mut list: Vec<saga_core::SavedGame>| {
        list.sort_by_key(|g| g.id);
        list
    };
    assert_eq!(
        by_id(h.engine.checkpoints().await.expect("list")),
        by_id(games.clone())
    );

    assert!(h.engine.undo_delete().await.expect("undo").is_empty());
}

// =============================================================================
// TEST 4: A saved game can be resumed by a fresh engine
// =============================================================================

#[tokio::test]
async fn test_resume_and_continue() {
    let dir = TempDir::new().expect("temp dir");
    let provider = Arc::new(MockProvider::new());
    let engine = SessionEngine::new(
        provider.clone(),
        Arc::new(JsonDirStore::new(dir.path())),
        test_config(),
    );

    provider.queue(MockTurn::new("The tower bell rings twice."));
    engine
        .start(saga_core::testing::TestHarness::setup())
        .await
        .expect("opening");
    provider.queue(MockTurn::new("A raven lands beside you.").with_location("belfry"));
    engine.advance("Climb the tower").await.expect("turn");
    assert!(engine.flush_checkpoints().await.is_empty());
    let original = engine.context().expect("context");

    let saves = dir.path().join("saves");
    assert_eq!(std::fs::read_dir(&saves).expect("saves dir").count(), 3);

    // A second engine over the same directory.
    let store = Arc::new(JsonDirStore::new(dir.path()));
    let latest = store
        .get_all()
        .await
        .expect("load")
        .into_iter()
        .filter(|g| g.save_type == SaveType::Auto)
        .max_by_key(|g| g.metadata.turn_count)
        .expect("an auto checkpoint");
    assert_eq!(latest.location.as_deref(), Some("belfry"));

    let provider = Arc::new(MockProvider::new());
    let resumed = SessionEngine::new(provider.clone(), store, test_config());
    assert_eq!(resumed.state(), SessionState::Idle);
    resumed.resume(latest).expect("resume");
    assert_eq!(resumed.state(), SessionState::Playing);
    assert_eq!(*resumed.context().expect("context"), *original);

    provider.queue(MockTurn::new("The raven speaks your name."));
    let report = resumed.advance("Listen").await.expect("turn");
    assert_eq!(report.segment.caused_by.as_deref(), Some("Listen"));
    assert_eq!(resumed.context().expect("context").history.len(), 3);
}

// =============================================================================
// TEST 5: Failed checkpoint writes never undo a committed turn
// =============================================================================

#[tokio::test]
async fn test_checkpoint_failure_keeps_turn() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    h.engine.flush_checkpoints().await;

    h.store.fail_writes(true);
    let report = h
        .advance("Go", MockTurn::new("Onward."))
        .await
        .expect("turn commits even if saving fails");
    let errors = h.engine.flush_checkpoints().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(h.current_segment().id, report.segment.id);

    let err = h.engine.save_manual().await.unwrap_err();
    assert!(matches!(err, SessionError::Persistence(_)));

    // Once storage recovers the same segment can still be saved.
    h.store.fail_writes(false);
    assert!(h.engine.save_manual().await.expect("save").is_saved());
}

// =============================================================================
// TEST 6: Checkpoint operations need a story
// =============================================================================

#[tokio::test]
async fn test_checkpoints_before_start() {
    let h = TestHarness::new();
    assert!(matches!(
        h.engine.save_manual().await,
        Err(SessionError::NotStarted)
    ));
    assert!(matches!(
        h.engine.checkpoints().await,
        Err(SessionError::NotStarted)
    ));
}

// =============================================================================
// TEST 7: A setup checkpoint resumes into a story that still needs its opening
// =============================================================================

#[tokio::test]
async fn test_resume_setup_checkpoint_and_open() {
    let first = TestHarness::new();
    first.start("Ignored opening").await.expect("opening");
    first.engine.flush_checkpoints().await;
    let setup = first
        .engine
        .checkpoints()
        .await
        .expect("list")
        .into_iter()
        .find(|g| g.save_type == SaveType::Setup)
        .expect("setup checkpoint");
    assert!(setup.context.history.is_empty());

    let h = TestHarness::new();
    h.engine.resume(setup.clone()).expect("resume");
    assert_eq!(h.engine.state(), SessionState::AwaitingOpening);
    assert!(matches!(
        h.engine.advance("Look around").await,
        Err(SessionError::NotStarted)
    ));

    h.expect_turn("The story begins again.");
    let report = h.engine.open().await.expect("open");
    assert_eq!(report.segment.text, "The story begins again.");
    assert_eq!(report.segment.caused_by, None);
    assert_eq!(h.engine.state(), SessionState::Playing);
    assert_eq!(h.context().session_id, setup.session_id);
    assert_eq!(h.context().history.len(), 1);

    // Once opened, the story plays on and cannot be opened twice.
    assert!(matches!(
        h.engine.open().await,
        Err(SessionError::Validation(_))
    ));
    h.advance("Look around", MockTurn::new("Fog.")).await.expect("turn");
    assert!(h.engine.flush_checkpoints().await.is_empty());
    assert_eq!(count(&h.engine.checkpoints().await.expect("list"), SaveType::Auto), 2);
}

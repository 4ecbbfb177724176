//! QA tests for chapter planning and progression.
//!
//! These tests drive the engine through scripted turns and check how the
//! blueprint advances.
//! Run with: `cargo test -p saga-core --test qa_chapter_flow`

use saga_core::plot::ChapterStatus;
use saga_core::testing::assertions::{
    assert_active_chapter, assert_chapter_status, assert_no_active_chapter,
};
use saga_core::{
    Archetype, MockResponse, MockTurn, PlanRequest, Protagonist, SessionError, SessionSetup,
    SupportingCharacter, TestHarness,
};

async fn harness_with_plan() -> TestHarness {
    let h = TestHarness::new();
    h.start("The caravan halts at the edge of the salt flats.")
        .await
        .expect("opening should succeed");

    h.expect(MockResponse::plan(
        &[("Arrival", 300, &["Mira"]), ("Storm", 500, &[])],
        &[("Mira", "herbalist", Some("ally"))],
    ));
    h.engine
        .plan_chapters(PlanRequest::new(2, 100, 1000))
        .await
        .expect("planning should succeed");
    h
}

// =============================================================================
// TEST 1: Three turns complete a chapter and activate the next
// =============================================================================

#[tokio::test]
async fn test_three_turn_chapter_completion() {
    let h = harness_with_plan().await;
    let ctx = h.context();
    assert_active_chapter(&ctx, "Arrival");
    assert_eq!(ctx.characters.len(), 1);

    let first = h
        .advance("Follow the tracks", MockTurn::of_length(100))
        .await
        .expect("turn 1");
    assert!(first.chapter_transition.is_none());

    let second = h
        .advance("Wait for nightfall", MockTurn::of_length(150).with_event("evt-1"))
        .await
        .expect("turn 2");
    assert!(second.chapter_transition.is_none());

    let ctx = h.context();
    let stats = ctx.blueprint[0].tracked_stats;
    assert_eq!(stats.current_word_count, 250);
    assert_eq!(stats.events_triggered, 1);
    assert_eq!(stats.interactions_count, 0);

    let third = h
        .advance("Ask Mira for help", MockTurn::of_length(60).with_character("Mira"))
        .await
        .expect("turn 3");
    let transition = third.chapter_transition.expect("chapter should complete");

    let ctx = h.context();
    assert_eq!(transition.completed, ctx.blueprint[0].id);
    assert_eq!(transition.activated, Some(ctx.blueprint[1].id));
    assert_chapter_status(&ctx, "Arrival", ChapterStatus::Completed);
    assert_active_chapter(&ctx, "Storm");
    assert_eq!(ctx.blueprint[0].tracked_stats.current_word_count, 310);
    assert_eq!(ctx.finished_chapters, 1);
}

// =============================================================================
// TEST 2: Completed chapters stay completed; the last one leaves no active chapter
// =============================================================================

#[tokio::test]
async fn test_progression_is_forward_only() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    h.expect(MockResponse::plan(&[("Only", 10, &["Vell"])], &[]));
    h.engine
        .plan_chapters(PlanRequest::new(1, 10, 10))
        .await
        .expect("plan");

    let report = h
        .advance(
            "Confront Vell",
            MockTurn::of_length(20).with_event("duel").with_character("vell"),
        )
        .await
        .expect("turn");
    assert!(report.chapter_transition.is_some());
    assert_eq!(report.chapter_transition.and_then(|t| t.activated), None);

    let frozen = h.context().blueprint[0].clone();
    for _ in 0..3 {
        h.advance(
            "Keep going",
            MockTurn::of_length(50).with_event("x").with_character("Vell"),
        )
        .await
        .expect("turn");
        let ctx = h.context();
        assert_eq!(ctx.blueprint[0], frozen);
        assert_no_active_chapter(&ctx);
    }
}

// =============================================================================
// TEST 3: Extending a plan appends without disturbing the active chapter
// =============================================================================

#[tokio::test]
async fn test_extend_plan_appends() {
    let h = harness_with_plan().await;

    h.expect(MockResponse::plan(&[("Aftermath", 50, &[])], &[("Vell", "rival", Some("bogus"))]));
    let report = h
        .engine
        .plan_chapters(PlanRequest::new(1, 200, 400).extending())
        .await
        .expect("extend");

    assert_eq!(report.chapters.len(), 1);
    assert_eq!(report.characters.len(), 1);
    assert_eq!(report.activated, None);

    let ctx = h.context();
    assert_eq!(ctx.blueprint.len(), 3);
    assert_eq!(ctx.blueprint[2].title, "Aftermath");
    assert_eq!(ctx.blueprint[2].target_word_count, 200);
    assert_eq!(ctx.blueprint[2].status, ChapterStatus::Pending);
    assert_active_chapter(&ctx, "Arrival");

    let vell = ctx.character("Vell").expect("new character");
    assert!(Archetype::CATALOG.contains(&vell.archetype));
    assert!((-10..=10).contains(&vell.affinity));
}

// =============================================================================
// TEST 4: Invalid plan requests never reach the backend
// =============================================================================

#[tokio::test]
async fn test_invalid_plan_request() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    let calls = h.provider.calls().len();

    let err = h
        .engine
        .plan_chapters(PlanRequest::new(0, 100, 200))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(h.provider.calls().len(), calls);
}

// =============================================================================
// TEST 5: Scheduled events complete when a turn triggers them
// =============================================================================

#[tokio::test]
async fn test_scheduled_event_completion() {
    let h = TestHarness::new();
    h.start("Opening").await.expect("opening");
    let event = h
        .engine
        .schedule_event("The lighthouse goes dark")
        .expect("schedule");

    let unrelated = h
        .advance("Look around", MockTurn::new("Nothing yet.").with_event("not-an-id"))
        .await
        .expect("turn");
    assert_eq!(unrelated.completed_event, None);

    let report = h
        .advance("Climb the stairs", MockTurn::new("The light dies.").with_event(event))
        .await
        .expect("turn");
    assert_eq!(report.completed_event, Some(event));

    let ctx = h.context();
    let scheduled = &ctx.scheduled_events[0];
    assert_eq!(scheduled.completed_turn, Some(2));

    // A second trigger leaves the completed event untouched.
    let again = h
        .advance("Wait", MockTurn::new("Darkness.").with_event(event))
        .await
        .expect("turn");
    assert_eq!(again.completed_event, None);
    assert_eq!(h.context().scheduled_events[0].completed_turn, Some(2));

    assert!(matches!(
        h.engine.schedule_event("   "),
        Err(SessionError::Validation(_))
    ));
}

// =============================================================================
// TEST 6: Affinity deltas are additive and unclamped
// =============================================================================

#[tokio::test]
async fn test_affinity_updates() {
    let h = TestHarness::new();
    h.expect_turn("Mira waves from the dock.");
    h.engine
        .start(
            SessionSetup::new("fantasy", Protagonist::new("Ayla", "curious"))
                .with_character(SupportingCharacter::new("Mira", "herbalist", Archetype::Ally)),
        )
        .await
        .expect("opening");

    h.advance("Greet her", MockTurn::new("She smiles.").with_affinity("mira", 40))
        .await
        .expect("turn");
    h.advance(
        "Give her the herbs",
        MockTurn::new("She beams.")
            .with_affinity("MIRA", 75)
            .with_affinity("Stranger", 5),
    )
    .await
    .expect("turn");

    assert_eq!(h.affinity("Mira"), 115);
    assert!(h.context().character("Stranger").is_none());
}

// =============================================================================
// TEST 7: Huge deltas saturate instead of failing the turn
// =============================================================================

#[tokio::test]
async fn test_extreme_affinity_deltas() {
    let h = TestHarness::new();
    h.expect_turn("Mira waves from the dock.");
    h.engine
        .start(
            SessionSetup::new("fantasy", Protagonist::new("Ayla", "curious"))
                .with_character(SupportingCharacter::new("Mira", "herbalist", Archetype::Ally)),
        )
        .await
        .expect("opening");

    h.advance(
        "Save her life",
        MockTurn::new("She will never forget it.")
            .with_affinity("Mira", i32::MAX)
            .with_affinity("Mira", 1),
    )
    .await
    .expect("turn should commit");

    assert_eq!(h.affinity("Mira"), i32::MAX);
    assert_eq!(h.engine.state(), saga_core::SessionState::Playing);
}

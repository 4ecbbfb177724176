//! Walk through a short story against a scripted backend.
//!
//! Reads `SAGA_*` settings from the environment (and `.env`), so the demo
//! shows which models a real backend would be asked for.
//!
//! Run with: `RUST_LOG=saga_core=debug cargo run -p saga-core --example scripted_session`

use saga_core::{
    Archetype, EngineConfig, JsonDirStore, MockProvider, MockResponse, MockTurn, Mood,
    PlanRequest, Protagonist, RegenerationMode, SessionEngine, SessionSetup, SupportingCharacter,
    VersionDirection,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env()?.with_images(false);
    println!("=== Scripted session ({} / {}) ===\n", config.text_model, config.image_model);

    let data = tempfile::TempDir::new()?;
    let provider = Arc::new(MockProvider::new());
    let engine = SessionEngine::new(provider.clone(), Arc::new(JsonDirStore::new(data.path())), config);

    // 1. Opening
    provider.queue(
        MockTurn::new("Fog rolls over the harbor as the last ferry leaves without you.")
            .with_story_name("The Last Ferry")
            .with_location("harbor")
            .with_choices(&["Hail a fishing boat", "Look for shelter"]),
    );
    let setup = SessionSetup::new("coastal mystery", Protagonist::new("Ayla", "curious"))
        .with_character(SupportingCharacter::new("Mira", "harbor master", Archetype::Mentor));
    let opening = engine.start(setup).await?;
    println!("1. {}", opening.segment.text);
    for (i, choice) in opening.segment.choices.iter().enumerate() {
        println!("   [{}] {choice}", i + 1);
    }

    // 2. Plan two chapters
    provider.queue(MockResponse::plan(
        &[("Stranded", 120, &["Mira"]), ("The Lighthouse", 400, &[])],
        &[("Tobin", "ferryman", Some("trickster"))],
    ));
    let plan = engine.plan_chapters(PlanRequest::new(2, 100, 800)).await?;
    println!("\n2. Planned {} chapters, {} new characters", plan.chapters.len(), plan.characters.len());

    // 3. A few turns
    let turns = [
        (
            "Hail a fishing boat",
            MockTurn::new("Mira waves you over to her office.")
                .with_character("Mira")
                .with_affinity("Mira", 5)
                .with_mood(Mood::Mysterious),
        ),
        (
            "Ask about the lighthouse",
            MockTurn::of_length(120).with_event("ferry-missing"),
        ),
    ];
    for (choice, turn) in turns {
        provider.queue(turn);
        let report = engine.advance(choice).await?;
        let snippet: String = report.segment.text.chars().take(60).collect();
        println!("\n3. > {choice}\n   {snippet}");
        if let Some(transition) = report.chapter_transition {
            println!("   chapter complete; next active: {:?}", transition.activated);
        }
    }

    // 4. Regenerate the latest choices and flip between versions
    let latest = engine.context().and_then(|ctx| ctx.current_segment_id);
    if let Some(id) = latest {
        provider.queue(MockResponse::choices(&["Climb the stairs", "Wait for dawn"]));
        let segment = engine.regenerate(id, RegenerationMode::Choices).await?;
        println!("\n4. New choices: {:?}", segment.choices);
        engine.switch_version(id, VersionDirection::Previous)?;
    }

    // 5. Checkpoints
    let failures = engine.flush_checkpoints().await;
    let saves = engine.checkpoints().await?;
    println!("\n5. {} checkpoints, {} write failures", saves.len(), failures.len());
    for save in &saves {
        println!("   {:?} turn {}: {}", save.save_type, save.metadata.turn_count, save.summary);
    }

    println!("\n=== Done ===");
    Ok(())
}

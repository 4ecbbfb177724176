//! Prompt assembly from the game context.
//!
//! Only the structure lives here: which parts of the context are handed to
//! the backend and in what order. Wording is deliberately minimal.

use crate::plot::{PlanRequest, PlotChapter};
use crate::story::{EventStatus, GameContext, Mood, StorySegment};

/// Shared header: world, protagonist, cast, memory, plot position.
fn build_header(ctx: &GameContext) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("## Genre: {}\n", ctx.genre));
    if !ctx.story_name.is_empty() {
        prompt.push_str(&format!("## Story: {}\n", ctx.story_name));
    }

    let world = &ctx.world;
    if !world.title.is_empty() || !world.setting.is_empty() {
        prompt.push_str("\n## World\n");
        if !world.title.is_empty() {
            prompt.push_str(&format!("**Title:** {}\n", world.title));
        }
        if !world.setting.is_empty() {
            prompt.push_str(&format!("**Setting:** {}\n", world.setting));
        }
        if !world.tone.is_empty() {
            prompt.push_str(&format!("**Tone:** {}\n", world.tone));
        }
        for rule in &world.rules {
            prompt.push_str(&format!("- {rule}\n"));
        }
    }

    let hero = &ctx.protagonist;
    prompt.push_str("\n## Protagonist\n");
    prompt.push_str(&format!("**Name:** {}\n", hero.name));
    prompt.push_str(&format!("**Trait:** {}\n", hero.trait_));
    if !hero.description.is_empty() {
        prompt.push_str(&format!("**Description:** {}\n", hero.description));
    }

    if !ctx.characters.is_empty() {
        prompt.push_str("\n## Characters\n");
        for c in &ctx.characters {
            prompt.push_str(&format!(
                "- {} ({}, {}), affinity {}\n",
                c.name,
                c.role,
                c.archetype.name(),
                c.affinity
            ));
        }
    }

    let pending: Vec<_> = ctx
        .scheduled_events
        .iter()
        .filter(|e| e.status == EventStatus::Pending)
        .collect();
    if !pending.is_empty() {
        prompt.push_str("\n## Scheduled Events\n");
        for event in pending {
            prompt.push_str(&format!("- [{}] {}\n", event.id, event.description));
        }
    }

    if let Some(progress) = crate::plot::progress(&ctx.blueprint) {
        prompt.push_str("\n## Plot\n");
        prompt.push_str(&progress);
        prompt.push('\n');
        if let Some(chapter) = crate::plot::active_chapter(&ctx.blueprint) {
            describe_chapter(&mut prompt, chapter);
        }
    }

    let memory = ctx.memory.build_context();
    if !memory.is_empty() {
        prompt.push('\n');
        prompt.push_str(&memory);
    }

    prompt
}

fn describe_chapter(prompt: &mut String, chapter: &PlotChapter) {
    if !chapter.summary.is_empty() {
        prompt.push_str(&format!("**Summary:** {}\n", chapter.summary));
    }
    if !chapter.key_events.is_empty() {
        prompt.push_str(&format!("**Key events:** {}\n", chapter.key_events));
    }
    if !chapter.key_characters.is_empty() {
        prompt.push_str(&format!(
            "**Key characters:** {}\n",
            chapter.key_characters.join(", ")
        ));
    }
}

fn push_history(prompt: &mut String, history: &[StorySegment], window: usize) {
    let start = history.len().saturating_sub(window);
    if history[start..].is_empty() {
        return;
    }
    prompt.push_str("\n## Recent Story\n");
    for segment in &history[start..] {
        if let Some(input) = &segment.caused_by {
            prompt.push_str(&format!("> {input}\n"));
        }
        prompt.push_str(&segment.text);
        prompt.push_str("\n\n");
    }
}

/// Prompt for the opening segment.
pub fn opening(ctx: &GameContext) -> String {
    let mut prompt = build_header(ctx);
    prompt.push_str("\n## Task\nWrite the opening scene.\n");
    prompt
}

/// Prompt for the segment that follows `history` after `choice`.
pub fn next_turn(ctx: &GameContext, history: &[StorySegment], choice: &str, window: usize) -> String {
    let mut prompt = build_header(ctx);
    push_history(&mut prompt, history, window);
    prompt.push_str(&format!("\n## Reader Choice\n{choice}\n"));
    prompt.push_str("\n## Task\nContinue the story from this choice.\n");
    prompt
}

/// Prompt for fresh choices on the latest segment.
pub fn choices(ctx: &GameContext, window: usize) -> String {
    let mut prompt = build_header(ctx);
    push_history(&mut prompt, &ctx.history, window);
    prompt.push_str("\n## Task\nOffer new choices for the final scene above.\n");
    prompt
}

/// Prompt for a chapter plan.
pub fn chapter_plan(ctx: &GameContext, request: &PlanRequest) -> String {
    let mut prompt = build_header(ctx);
    if !ctx.blueprint.is_empty() {
        prompt.push_str("\n## Existing Chapters\n");
        for (i, chapter) in ctx.blueprint.iter().enumerate() {
            prompt.push_str(&format!("{}. {} - {}\n", i + 1, chapter.title, chapter.summary));
        }
    }
    prompt.push_str(&format!(
        "\n## Task\nPlan {} chapters of {}-{} words each.\n",
        request.chapter_count, request.min_words, request.max_words
    ));
    if let Some(guidance) = &request.guidance {
        prompt.push_str(&format!("\n## Guidance\n{guidance}\n"));
    }
    prompt
}

/// Prompt for an avatar portrait.
pub fn avatar(name: &str, description: &str, genre: &str) -> String {
    format!("Portrait of {name}, {description}. Genre: {genre}.")
}

/// Prompt for a scene illustration.
pub fn scene(visual_prompt: &str, mood: Mood, genre: &str) -> String {
    format!("{}. Mood: {}. Genre: {genre}.", visual_prompt.trim(), mood.name())
}

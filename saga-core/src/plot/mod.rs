//! Plot blueprint: chapters, progression and automatic planning.

mod chapter;
mod planner;
mod tracker;

pub use chapter::{
    ChapterStatus, CompletionCriteria, Pacing, PlotChapter, TrackedStats, TurnOutcome,
};
pub use planner::{
    apply_plan, ChapterPlan, ChapterPlanner, PlanError, PlanOutcome, PlanRequest,
    PlannedChapter, PlannedCharacter,
};
pub use tracker::{active_chapter, active_index, progress, ChapterTracker, ChapterTransition};

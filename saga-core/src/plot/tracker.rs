//! Chapter progression state machine.
//!
//! Only the active chapter moves. When its completion predicate holds it
//! becomes `Completed` and the next chapter in blueprint order becomes
//! `Active`. Chapters never move backwards.

use super::chapter::{ChapterStatus, PlotChapter, TurnOutcome};
use crate::id::ChapterId;

/// A chapter transition produced by one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterTransition {
    pub completed: ChapterId,
    pub activated: Option<ChapterId>,
}

/// Progress view over a blueprint.
pub struct ChapterTracker<'a> {
    chapters: &'a mut [PlotChapter],
}

impl<'a> ChapterTracker<'a> {
    /// Wrap a blueprint.
    pub fn new(chapters: &'a mut [PlotChapter]) -> Self {
        Self { chapters }
    }

    /// Index of the active chapter.
    pub fn active_index(&self) -> Option<usize> {
        active_index(self.chapters)
    }

    /// Activate the first pending chapter if nothing is active and every
    /// chapter before it is completed. Returns the activated chapter.
    pub fn ensure_active(&mut self) -> Option<ChapterId> {
        if self.active_index().is_some() {
            return None;
        }
        let next = self
            .chapters
            .iter()
            .position(|c| c.status != ChapterStatus::Completed)?;
        let chapter = &mut self.chapters[next];
        if chapter.status != ChapterStatus::Pending {
            return None;
        }
        chapter.status = ChapterStatus::Active;
        Some(chapter.id)
    }

    /// Fold one turn into the active chapter.
    pub fn apply_turn(&mut self, outcome: &TurnOutcome) -> Option<ChapterTransition> {
        let index = self.active_index()?;
        let chapter = &mut self.chapters[index];

        chapter.tracked_stats.current_word_count = chapter
            .tracked_stats
            .current_word_count
            .saturating_add(outcome.text_length);
        if outcome.triggered_event_id.is_some() {
            chapter.tracked_stats.events_triggered += 1;
        }
        if let Some(name) = &outcome.active_character_name {
            if chapter.involves(name) {
                chapter.tracked_stats.interactions_count += 1;
            }
        }

        if !chapter.is_satisfied() {
            return None;
        }

        chapter.status = ChapterStatus::Completed;
        let completed = chapter.id;
        tracing::info!(chapter = %chapter.title, "chapter completed");

        let activated = self.chapters.get_mut(index + 1).map(|next| {
            next.status = ChapterStatus::Active;
            next.id
        });

        Some(ChapterTransition {
            completed,
            activated,
        })
    }

    /// One-line progress summary of the active chapter.
    pub fn progress(&self) -> Option<String> {
        progress(self.chapters)
    }
}

/// Index of the active chapter in a blueprint.
pub fn active_index(chapters: &[PlotChapter]) -> Option<usize> {
    chapters.iter().position(|c| c.status == ChapterStatus::Active)
}

/// One-line progress summary of the active chapter, for prompts.
pub fn progress(chapters: &[PlotChapter]) -> Option<String> {
    let chapter = active_chapter(chapters)?;
    let stats = &chapter.tracked_stats;
    Some(format!(
        "Chapter \"{}\": {}/{} words, {}/{} key events, {}/{} interactions",
        chapter.title,
        stats.current_word_count,
        chapter.target_word_count,
        stats.events_triggered,
        chapter.completion_criteria.min_key_events,
        stats.interactions_count,
        chapter.completion_criteria.min_interactions,
    ))
}

/// The active chapter of a blueprint.
pub fn active_chapter(chapters: &[PlotChapter]) -> Option<&PlotChapter> {
    active_index(chapters).map(|i| &chapters[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(n: usize) -> Vec<PlotChapter> {
        (0..n)
            .map(|i| {
                PlotChapter::new(format!("Chapter {i}"), 100)
                    .with_key_characters(vec!["Mira".into()])
            })
            .collect()
    }

    fn active_count(chapters: &[PlotChapter]) -> usize {
        chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::Active)
            .count()
    }

    fn full_turn() -> TurnOutcome {
        TurnOutcome {
            text_length: 100,
            triggered_event_id: Some("e".into()),
            active_character_name: Some("Mira".into()),
        }
    }

    #[test]
    fn test_single_active_for_all_sizes() {
        for n in 0..6 {
            let mut chapters = blueprint(n);
            let mut tracker = ChapterTracker::new(&mut chapters);
            tracker.ensure_active();
            assert!(active_count(&chapters) <= 1);

            for _ in 0..(n + 2) {
                ChapterTracker::new(&mut chapters).apply_turn(&full_turn());
                assert!(active_count(&chapters) <= 1);
            }
            assert!(chapters.iter().all(|c| c.status == ChapterStatus::Completed));
        }
    }

    #[test]
    fn test_completed_is_monotonic() {
        let mut chapters = blueprint(2);
        let mut tracker = ChapterTracker::new(&mut chapters);
        tracker.ensure_active();
        let transition = tracker.apply_turn(&full_turn()).unwrap();
        assert_eq!(transition.activated, Some(chapters[1].id));

        let frozen = chapters[0].clone();
        for _ in 0..5 {
            ChapterTracker::new(&mut chapters).apply_turn(&full_turn());
            assert_eq!(chapters[0], frozen);
        }
    }

    #[test]
    fn test_last_chapter_leaves_stable_terminal() {
        let mut chapters = blueprint(1);
        let mut tracker = ChapterTracker::new(&mut chapters);
        tracker.ensure_active();
        let transition = tracker.apply_turn(&full_turn()).unwrap();
        assert_eq!(transition.activated, None);
        assert!(tracker.apply_turn(&full_turn()).is_none());
        assert!(tracker.ensure_active().is_none());
        assert!(active_chapter(&chapters).is_none());
    }

    #[test]
    fn test_interaction_requires_key_character() {
        let mut chapters = blueprint(1);
        let mut tracker = ChapterTracker::new(&mut chapters);
        tracker.ensure_active();
        tracker.apply_turn(&TurnOutcome {
            text_length: 500,
            triggered_event_id: Some("e".into()),
            active_character_name: Some("Stranger".into()),
        });
        assert_eq!(chapters[0].status, ChapterStatus::Active);
        assert_eq!(chapters[0].tracked_stats.interactions_count, 0);
        assert_eq!(chapters[0].tracked_stats.events_triggered, 1);
    }

    #[test]
    fn test_ensure_active_after_append() {
        let mut chapters = blueprint(1);
        chapters[0].status = ChapterStatus::Completed;
        chapters.extend(blueprint(2));

        let activated = ChapterTracker::new(&mut chapters).ensure_active();
        assert_eq!(activated, Some(chapters[1].id));
        assert_eq!(chapters[2].status, ChapterStatus::Pending);
    }

    #[test]
    fn test_progress_summary() {
        let mut chapters = blueprint(1);
        let mut tracker = ChapterTracker::new(&mut chapters);
        assert!(tracker.progress().is_none());
        tracker.ensure_active();
        let progress = tracker.progress().unwrap();
        assert!(progress.contains("0/100 words"));
    }
}

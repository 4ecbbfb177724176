//! Scheduled story events.

use crate::id::EventId;
use serde::{Deserialize, Serialize};

/// Lifecycle of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Completed,
}

/// An event the story is expected to reach. Immutable once completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub id: EventId,
    pub description: String,
    pub status: EventStatus,
    pub created_turn: u32,
    #[serde(default)]
    pub completed_turn: Option<u32>,
}

impl ScheduledEvent {
    /// Create a pending event.
    pub fn new(description: impl Into<String>, created_turn: u32) -> Self {
        Self {
            id: EventId::new(),
            description: description.into(),
            status: EventStatus::Pending,
            created_turn,
            completed_turn: None,
        }
    }

    /// Mark the event completed. Returns false if it already was.
    pub fn complete(&mut self, turn: u32) -> bool {
        if self.status == EventStatus::Completed {
            return false;
        }
        self.status = EventStatus::Completed;
        self.completed_turn = Some(turn);
        true
    }
}

/// Complete the pending event whose ID matches `triggered`.
///
/// Returns the completed event's ID, if any.
pub fn complete_triggered(
    events: &mut [ScheduledEvent],
    triggered: &str,
    turn: u32,
) -> Option<EventId> {
    let triggered = triggered.trim();
    let event = events
        .iter_mut()
        .find(|e| e.status == EventStatus::Pending && e.id.to_string() == triggered)?;
    event.complete(turn);
    Some(event.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_is_one_shot() {
        let mut event = ScheduledEvent::new("The storm breaks", 2);
        assert!(event.complete(5));
        assert!(!event.complete(9));
        assert_eq!(event.completed_turn, Some(5));
    }

    #[test]
    fn test_complete_triggered_matches_id() {
        let mut events = vec![
            ScheduledEvent::new("The storm breaks", 0),
            ScheduledEvent::new("A letter arrives", 0),
        ];
        let target = events[1].id;

        assert_eq!(complete_triggered(&mut events, "unrelated", 3), None);
        assert_eq!(
            complete_triggered(&mut events, &target.to_string(), 3),
            Some(target)
        );
        assert_eq!(events[1].status, EventStatus::Completed);
        assert_eq!(events[0].status, EventStatus::Pending);

        // Completed events are not matched again.
        assert_eq!(complete_triggered(&mut events, &target.to_string(), 4), None);
        assert_eq!(events[1].completed_turn, Some(3));
    }
}

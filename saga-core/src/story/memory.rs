//! Rolling memory buffers carried between turns.
//!
//! The engine never merges memory itself: every generation returns a
//! complete replacement, and the backend decides what to carry forward.

use crate::Schema;
use serde::{Deserialize, Serialize};

/// Named memory buffers produced by each generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
#[schema(name = "memory_update", rename_all = "camelCase")]
pub struct MemoryState {
    /// Short-term notes about the current scene
    pub zone: String,
    /// Running summary of the story so far
    pub story: String,
    /// Long-term memory of significant past events
    pub long_term: String,
    /// Durable facts that must never be forgotten
    pub core: String,
    /// Notes on characters met and their state
    pub characters: String,
    /// Items the protagonist carries
    pub inventory: String,
}

impl MemoryState {
    /// Whether every buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.zone.is_empty()
            && self.story.is_empty()
            && self.long_term.is_empty()
            && self.core.is_empty()
            && self.characters.is_empty()
            && self.inventory.is_empty()
    }

    /// Render the non-empty buffers as labelled prompt sections.
    pub fn build_context(&self) -> String {
        let sections = [
            ("Core Memory", &self.core),
            ("Long-Term Memory", &self.long_term),
            ("Story So Far", &self.story),
            ("Current Zone", &self.zone),
            ("Characters", &self.characters),
            ("Inventory", &self.inventory),
        ];

        let mut context = String::new();
        for (label, body) in sections {
            if body.trim().is_empty() {
                continue;
            }
            context.push_str(&format!("## {label}\n{}\n\n", body.trim()));
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_all_buffers() {
        let schema = MemoryState::json_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert!(required.iter().any(|v| v == "longTerm"));
        assert_eq!(schema["properties"]["inventory"]["type"], "string");
    }

    #[test]
    fn test_build_context_skips_empty() {
        let memory = MemoryState {
            core: "The lighthouse keeper is the narrator's father.".into(),
            inventory: "A brass key".into(),
            ..Default::default()
        };
        let context = memory.build_context();
        assert!(context.contains("## Core Memory"));
        assert!(context.contains("## Inventory"));
        assert!(!context.contains("## Current Zone"));
        assert!(!memory.is_empty());
        assert!(MemoryState::default().is_empty());
    }
}

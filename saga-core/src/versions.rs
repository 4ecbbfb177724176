//! Alternate renderings of a story segment.
//!
//! Versions are append-only. The live fields of a segment always mirror
//! `versions[current_version_index]` once the list is non-empty.

use crate::story::{SegmentVersion, StorySegment};
use serde::{Deserialize, Serialize};

/// What a regeneration replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenerationMode {
    /// Text, choices, visual prompt, mood and location.
    Full,
    /// Prose, mood and location. Choices only if new ones are offered.
    Text,
    /// Choices of the latest segment only.
    Choices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionDirection {
    Previous,
    Next,
}

/// Record a new rendering and make it live.
///
/// The first regeneration snapshots the original as version 0.
pub fn record_regeneration(segment: &mut StorySegment, version: SegmentVersion) {
    if segment.versions.is_empty() {
        segment.versions.push(segment.snapshot());
    }
    segment.apply_version(&version);
    segment.versions.push(version);
    segment.current_version_index = segment.versions.len() - 1;
}

/// Step to the neighbouring version, wrapping at both ends.
///
/// Returns false and leaves the segment untouched when there is nothing
/// to switch to.
pub fn switch_version(segment: &mut StorySegment, direction: VersionDirection) -> bool {
    let len = segment.versions.len();
    if len < 2 {
        return false;
    }
    let current = segment.current_version_index.min(len - 1);
    let target = match direction {
        VersionDirection::Next => (current + 1) % len,
        VersionDirection::Previous => (current + len - 1) % len,
    };
    if target == segment.current_version_index {
        return false;
    }
    let version = segment.versions[target].clone();
    segment.apply_version(&version);
    segment.current_version_index = target;
    tracing::debug!(segment = %segment.id, version = target, "switched segment version");
    true
}

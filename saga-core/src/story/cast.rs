//! The protagonist and supporting cast.

use crate::id::{CharacterId, GalleryId};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A named skill with a level, used for checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub level: u32,
}

/// The reader's character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protagonist {
    pub name: String,
    /// Defining personality trait.
    #[serde(rename = "trait")]
    pub trait_: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub avatar: Option<GalleryId>,
}

impl Protagonist {
    /// Create a protagonist with a name and defining trait.
    pub fn new(name: impl Into<String>, trait_: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trait_: trait_.into(),
            description: String::new(),
            skills: Vec::new(),
            avatar: None,
        }
    }

    /// Add a skill.
    pub fn with_skill(mut self, name: impl Into<String>, level: u32) -> Self {
        self.skills.push(Skill {
            name: name.into(),
            level,
        });
        self
    }

    /// Sum of all skill levels.
    pub fn skill_level(&self) -> u32 {
        self.skills.iter().map(|s| s.level).sum()
    }
}

/// Narrative archetype of a supporting character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Mentor,
    Ally,
    Rival,
    Trickster,
    Guardian,
    Herald,
    Shapeshifter,
    Shadow,
}

impl Archetype {
    /// The fixed archetype catalog.
    pub const CATALOG: [Archetype; 8] = [
        Archetype::Mentor,
        Archetype::Ally,
        Archetype::Rival,
        Archetype::Trickster,
        Archetype::Guardian,
        Archetype::Herald,
        Archetype::Shapeshifter,
        Archetype::Shadow,
    ];

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Archetype::Mentor => "mentor",
            Archetype::Ally => "ally",
            Archetype::Rival => "rival",
            Archetype::Trickster => "trickster",
            Archetype::Guardian => "guardian",
            Archetype::Herald => "herald",
            Archetype::Shapeshifter => "shapeshifter",
            Archetype::Shadow => "shadow",
        }
    }

    /// Parse an archetype name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::CATALOG.into_iter().find(|a| a.name() == lower)
    }

    /// Pick an archetype uniformly at random from the catalog.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::CATALOG[rng.gen_range(0..Self::CATALOG.len())]
    }
}

/// A non-player character in the story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingCharacter {
    pub id: CharacterId,
    pub name: String,
    pub role: String,
    /// Disposition toward the protagonist. Not clamped.
    pub affinity: i32,
    pub archetype: Archetype,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub avatar: Option<GalleryId>,
}

impl SupportingCharacter {
    /// Create a character with neutral affinity.
    pub fn new(name: impl Into<String>, role: impl Into<String>, archetype: Archetype) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            role: role.into(),
            affinity: 0,
            archetype,
            description: String::new(),
            personality: String::new(),
            avatar: None,
        }
    }

    /// Whether `name` refers to this character (case-insensitive).
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Apply an additive affinity delta to the named character.
///
/// Deltas are not clamped; a sum past the range of `i32` saturates.
///
/// Returns false when no character answers to the name.
pub fn apply_affinity(characters: &mut [SupportingCharacter], name: &str, change: i32) -> bool {
    match characters.iter_mut().find(|c| c.answers_to(name)) {
        Some(character) => {
            character.affinity = character.affinity.saturating_add(change);
            true
        }
        None => false,
    }
}

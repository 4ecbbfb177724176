//! Engine configuration.

use crate::fallback::FallbackTable;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default model for story text.
pub const DEFAULT_TEXT_MODEL: &str = "story-pro";

/// Default model for images.
pub const DEFAULT_IMAGE_MODEL: &str = "image-standard";

/// Errors from reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Configuration for a [`SessionEngine`](crate::SessionEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Preferred model for story text, plans and choices.
    pub text_model: String,

    /// Preferred model for scene images and avatars.
    pub image_model: String,

    /// Substitute models tried when the preferred one fails.
    pub fallback: FallbackTable,

    /// Whether to generate images at all.
    pub generate_images: bool,

    /// Bound on each backend attempt.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Number of deletions that can be undone.
    pub undo_depth: usize,

    /// Number of recent segments included in prompts.
    pub history_window: usize,

    /// Write an auto checkpoint after each committed turn.
    pub auto_checkpoint: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            fallback: FallbackTable::new()
                .with_chain(DEFAULT_TEXT_MODEL, ["story-flash", "story-lite"])
                .with_chain(DEFAULT_IMAGE_MODEL, ["image-fast"]),
            generate_images: true,
            request_timeout: Duration::from_secs(60),
            undo_depth: 10,
            history_window: 8,
            auto_checkpoint: true,
        }
    }
}

impl EngineConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SAGA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// Reads `SAGA_TEXT_MODEL`, `SAGA_IMAGE_MODEL`, `SAGA_GENERATE_IMAGES`
    /// and `SAGA_REQUEST_TIMEOUT_SECS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(model) = lookup("SAGA_TEXT_MODEL") {
            config.text_model = non_blank("SAGA_TEXT_MODEL", model)?;
        }
        if let Some(model) = lookup("SAGA_IMAGE_MODEL") {
            config.image_model = non_blank("SAGA_IMAGE_MODEL", model)?;
        }
        if let Some(flag) = lookup("SAGA_GENERATE_IMAGES") {
            config.generate_images = match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid("SAGA_GENERATE_IMAGES", flag, "expected a boolean")),
            };
        }
        if let Some(secs) = lookup("SAGA_REQUEST_TIMEOUT_SECS") {
            let parsed: u64 = secs
                .trim()
                .parse()
                .map_err(|_| invalid("SAGA_REQUEST_TIMEOUT_SECS", secs.clone(), "expected seconds"))?;
            if parsed == 0 {
                return Err(invalid("SAGA_REQUEST_TIMEOUT_SECS", secs, "must be positive"));
            }
            config.request_timeout = Duration::from_secs(parsed);
        }

        Ok(config)
    }

    /// Set the text model.
    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    /// Set the image model.
    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Set the fallback table.
    pub fn with_fallback(mut self, fallback: FallbackTable) -> Self {
        self.fallback = fallback;
        self
    }

    /// Enable or disable image generation.
    pub fn with_images(mut self, enabled: bool) -> Self {
        self.generate_images = enabled;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how many deletions can be undone.
    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }

    /// Set how many recent segments go into prompts.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Enable or disable auto checkpoints.
    pub fn with_auto_checkpoint(mut self, enabled: bool) -> Self {
        self.auto_checkpoint = enabled;
        self
    }
}

fn invalid(key: &str, value: String, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value,
        reason: reason.to_string(),
    }
}

fn non_blank(key: &str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(key, value, "must not be blank"));
    }
    Ok(trimmed.to_string())
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_text_model("local")
            .with_images(false)
            .with_undo_depth(3);
        assert_eq!(config.text_model, "local");
        assert!(!config.generate_images);
        assert_eq!(config.undo_depth, 3);
        assert_eq!(config.history_window, 8);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SAGA_TEXT_MODEL", " tiny "),
            ("SAGA_GENERATE_IMAGES", "off"),
            ("SAGA_REQUEST_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.text_model, "tiny");
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert!(!config.generate_images);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_lookup_rejects_invalid_values() {
        let err = EngineConfig::from_lookup(lookup(&[("SAGA_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SAGA_REQUEST_TIMEOUT_SECS"));

        assert!(EngineConfig::from_lookup(lookup(&[("SAGA_GENERATE_IMAGES", "maybe")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("SAGA_TEXT_MODEL", "  ")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("SAGA_REQUEST_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn test_serde_uses_seconds() {
        let config = EngineConfig::new().with_request_timeout(Duration::from_secs(42));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["requestTimeout"], 42);

        let partial: EngineConfig = serde_json::from_str(r#"{"undoDepth": 2}"#).unwrap();
        assert_eq!(partial.undo_depth, 2);
        assert_eq!(partial.text_model, DEFAULT_TEXT_MODEL);
    }
}

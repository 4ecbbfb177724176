//! Content generation backends.
//!
//! The engine only sees this trait: a backend that turns a prompt plus a
//! JSON schema into raw text, and a prompt into image bytes. Concrete
//! transports live outside this crate.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a backend can report for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model {0} does not support this operation")]
    Unsupported(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty response from {0}")]
    Empty(String),
}

/// A generative backend.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Generate text that should satisfy `schema`.
    ///
    /// The returned text is raw model output; it may be wrapped in prose or
    /// code fences and is cleaned up by [`crate::normalize`].
    async fn generate_structured_text(
        &self,
        model: &str,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, ProviderError>;

    /// Generate an image for `prompt`.
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>, ProviderError>;
}

//! Structured generation: fallback chain, then normalization and parsing.

use crate::fallback::{BackendExhaustedError, FallbackInvoker};
use crate::normalize::{parse_response, MalformedResponseError};
use crate::provider::ContentProvider;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure of a structured generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error(transparent)]
    Exhausted(#[from] BackendExhaustedError),

    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),
}

/// Generate text through the fallback chain and parse it as `T`.
///
/// Parsing happens once, on the first successful backend answer; a
/// malformed answer is not retried against the remaining models.
pub async fn generate_structured<T: DeserializeOwned>(
    provider: &dyn ContentProvider,
    invoker: &FallbackInvoker,
    model: &str,
    prompt: &str,
    schema: &serde_json::Value,
) -> Result<T, GenerationError> {
    let raw = invoker
        .invoke(model, |candidate| async move {
            provider
                .generate_structured_text(&candidate, prompt, schema)
                .await
        })
        .await?;
    Ok(parse_response(&raw)?)
}

/// Generate an image through the fallback chain.
pub async fn generate_image(
    provider: &dyn ContentProvider,
    invoker: &FallbackInvoker,
    model: &str,
    prompt: &str,
) -> Result<Vec<u8>, BackendExhaustedError> {
    invoker
        .invoke(model, |candidate| async move {
            provider.generate_image(&candidate, prompt).await
        })
        .await
}

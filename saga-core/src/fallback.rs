//! Lateral model fallback.
//!
//! A call is tried against the preferred model and then, in order, each
//! substitute listed for it in the fallback table. Every candidate gets
//! exactly one attempt.

use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Every candidate in a fallback chain failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("all models failed ({}): {}", .attempted.join(", "), last_error_message(.last_error))]
pub struct BackendExhaustedError {
    /// Models tried, in order.
    pub attempted: Vec<String>,
    /// The failure of the final candidate.
    pub last_error: Option<ProviderError>,
}

fn last_error_message(error: &Option<ProviderError>) -> String {
    match error {
        Some(e) => e.to_string(),
        None => "no candidates succeeded".to_string(),
    }
}

/// Maps a model identifier to its ordered substitutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackTable(HashMap<String, Vec<String>>);

impl FallbackTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register substitutes for a model.
    pub fn with_chain(
        mut self,
        model: impl Into<String>,
        substitutes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.0
            .insert(model.into(), substitutes.into_iter().map(Into::into).collect());
        self
    }

    /// Substitutes registered for `model`.
    pub fn substitutes(&self, model: &str) -> &[String] {
        self.0.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `[preferred] ++ substitutes(preferred)`, without repeats.
    pub fn candidates(&self, preferred: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let chain = std::iter::once(preferred)
            .chain(self.substitutes(preferred).iter().map(String::as_str));
        for model in chain {
            if !model.trim().is_empty() && !candidates.iter().any(|c| c == model) {
                candidates.push(model.to_string());
            }
        }
        candidates
    }
}

/// Runs an operation across a fallback chain.
#[derive(Debug, Clone)]
pub struct FallbackInvoker {
    table: FallbackTable,
    attempt_timeout: Option<Duration>,
}

impl FallbackInvoker {
    /// Create an invoker over a fallback table.
    pub fn new(table: FallbackTable) -> Self {
        Self {
            table,
            attempt_timeout: None,
        }
    }

    /// Bound each attempt; a timed-out attempt counts as a failure.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// The fallback table in use.
    pub fn table(&self) -> &FallbackTable {
        &self.table
    }

    /// Try `operation` against each candidate until one succeeds.
    pub async fn invoke<T, F, Fut>(
        &self,
        preferred: &str,
        mut operation: F,
    ) -> Result<T, BackendExhaustedError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let candidates = self.table.candidates(preferred);
        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_error = None;

        for model in candidates {
            attempted.push(model.clone());
            let attempt = operation(model.clone());
            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(limit)),
                },
                None => attempt.await,
            };

            match result {
                Ok(value) => {
                    if attempted.len() > 1 {
                        tracing::info!(model = %model, attempts = attempted.len(), "fallback model succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(model = %model, error = %error, "model attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(BackendExhaustedError {
            attempted,
            last_error,
        })
    }
}

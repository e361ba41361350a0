//! Text-generation seam.
//!
//! Personas and reviewers only see [`TextGenerator`]. Backends are slow and
//! fallible by assumption: every caller has a deterministic fallback, so a
//! generation error is an expected condition rather than a fault.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form text returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Errors from a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator returned no text")]
    Empty,
}

/// Result type for generation
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Opaque text-completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GenerationResult<Generation>;
}

/// Shared reference to a generator.
pub type SharedTextGenerator = Arc<dyn TextGenerator>;

/// Generator that always fails, forcing every caller onto its fallback path.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> GenerationResult<Generation> {
        Err(GenerationError::Unavailable("generation disabled".to_string()))
    }
}

/// Generate with an upper bound on wall-clock time. Empty output is an error.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    timeout: Duration,
) -> GenerationResult<Generation> {
    let generation = tokio::time::timeout(timeout, generator.generate(prompt))
        .await
        .map_err(|_| GenerationError::Timeout(timeout))??;
    if generation.text.trim().is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(generation)
}

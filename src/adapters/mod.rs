//! Generation Service interface.
//!
//! Every stage that needs text calls a [`Generator`] exactly once per
//! message. Retries and timeouts are the generator's own concern; callers
//! only see the final result or the final error.

pub mod ollama;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::Usage;

pub use ollama::OllamaGenerator;
pub use retry::RetryPolicy;

/// A single generation request
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// User prompt
    pub prompt: String,

    /// System prompt (empty = none)
    pub system: String,

    /// Model override; the generator's default is used when `None`
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        self.model = model.map(str::to_string);
        self
    }
}

/// Output of a generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// Generated text with reasoning blocks removed
    pub text: String,

    /// Token accounting reported by the service
    pub usage: Usage,
}

impl Generation {
    pub fn new(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            usage,
        }
    }
}

/// Request/response text generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable generator name
    fn name(&self) -> &str;

    /// Generate text for a request
    async fn generate(&self, request: GenerationRequest) -> Result<Generation>;
}

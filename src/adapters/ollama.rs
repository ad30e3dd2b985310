//! Ollama generation client.
//!
//! Calls `POST {base_url}/api/generate` with streaming disabled and maps
//! `prompt_eval_count`/`eval_count` into [`Usage`]. Failed attempts are
//! retried according to the configured [`RetryPolicy`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Generation, GenerationRequest, Generator, RetryPolicy};
use crate::config::GenerationConfig;
use crate::domain::Usage;

/// Generator backed by an Ollama server
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    retry: RetryPolicy,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaGenerator {
    /// Create a client from configuration
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: config.retry.clone(),
            client,
        })
    }

    async fn call_api(&self, request: &GenerationRequest) -> Result<Generation> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateBody {
            model: request.model.as_deref().unwrap_or(&self.model),
            prompt: &request.prompt,
            stream: false,
            system: Some(request.system.as_str()).filter(|s| !s.is_empty()),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {}: {}", status, detail.trim());
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(Generation::new(
            strip_thinking(&parsed.response),
            Usage::new(parsed.prompt_eval_count, parsed.eval_count),
        ))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.call_api(&request).await {
                Ok(generation) => return Ok(generation),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e.context(format!("Generation failed after {} attempts", attempt)))
                }
            }
        }
    }
}

/// Remove `<think>...</think>` reasoning blocks some models emit
pub fn strip_thinking(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        match rest[start..].find(CLOSE) {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + end + CLOSE.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> GenerationConfig {
        GenerationConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let generator = OllamaGenerator::new(&config("http://gpu-box:11434/")).unwrap();
        assert_eq!(generator.base_url, "http://gpu-box:11434");
        assert_eq!(generator.name(), "ollama");
    }

    #[test]
    fn test_body_omits_empty_system() {
        let body = GenerateBody {
            model: "llama3",
            prompt: "hello",
            stream: false,
            system: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"stream\":false"));
        assert!(!json.contains("system"));
    }

    #[test]
    fn test_strip_thinking_blocks() {
        assert_eq!(
            strip_thinking("<think>plan it</think>\nOnce upon a time"),
            "Once upon a time"
        );
        assert_eq!(
            strip_thinking("A<think>x</think>B<think>y</think>C"),
            "ABC"
        );
        // Unterminated blocks are left alone
        assert_eq!(strip_thinking("A<think>dangling"), "A<think>dangling");
    }

    #[test]
    fn test_response_defaults_missing_counts() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(parsed.response, "hi");
        assert_eq!(parsed.prompt_eval_count, 0);
    }
}

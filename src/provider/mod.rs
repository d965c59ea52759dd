// MindHarbor - Text generator abstraction
//
// The orchestrator treats generation as an opaque, fallible and possibly slow
// `prompt -> text` call. Everything model-specific lives behind `Generator`.

pub mod factory;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Model parameters passed along with every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Extra attempts after a transient failure (5xx, 429, network).
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "llama3-8b-8192".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

impl From<&crate::config::GeneratorConfig> for GenerationParams {
    fn from(cfg: &crate::config::GeneratorConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            max_retries: cfg.max_retries,
            retry_delay_ms: cfg.retry_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A parsed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub finish_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a reply for `prompt`. May return an empty string; callers
    /// decide what empty means.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;

    /// Identifies the backend in logs and status output.
    fn name(&self) -> &str;
}

use crate::error::AnalysisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Ordered sequence of incremental text deltas from a streaming completion.
///
/// One-shot and non-restartable. Dropping the receiver cancels the
/// underlying network stream.
pub type TokenStream = mpsc::Receiver<Result<String, AnalysisError>>;

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, AnalysisError>;

    /// Dispatches a streaming completion. Dispatch failures, including rate
    /// limiting, are reported through the outer `Result` before any fragment
    /// is produced; mid-stream failures arrive as the final channel item.
    async fn stream(&self, request: LLMRequest) -> Result<TokenStream, AnalysisError>;

    fn model_name(&self) -> &str;
}

pub fn create_adapter(config: &ModelConfig) -> Result<Arc<dyn LLMAdapter>, AnalysisError> {
    match config.model_name.as_str() {
        // Anthropic Claude models (with or without the dash)
        name if name.starts_with("claude") => Ok(Arc::new(
            crate::adapters::AnthropicAdapter::new(config.clone())?,
        )),
        // OpenAI models
        name if name.starts_with("gpt-") || name.starts_with("o1-") => Ok(Arc::new(
            crate::adapters::OpenAIAdapter::new(config.clone())?,
        )),
        // Ollama models
        name if name.starts_with("ollama:") => Ok(Arc::new(
            crate::adapters::OllamaAdapter::new(config.clone())?,
        )),
        _name if config.base_url.as_ref().map_or(false, |u| u.contains("11434")) => Ok(Arc::new(
            crate::adapters::OllamaAdapter::new(config.clone())?,
        )),
        // Default to OpenAI for unknown models
        _ => Ok(Arc::new(crate::adapters::OpenAIAdapter::new(
            config.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_dispatch_by_model_name() {
        let mut config = ModelConfig::default();
        config.api_key = Some("test-key".to_string());

        config.model_name = "claude-sonnet-4-5".to_string();
        assert_eq!(
            create_adapter(&config).unwrap().model_name(),
            "claude-sonnet-4-5"
        );

        config.model_name = "gpt-4o".to_string();
        assert_eq!(create_adapter(&config).unwrap().model_name(), "gpt-4o");

        config.model_name = "ollama:llama3".to_string();
        assert_eq!(
            create_adapter(&config).unwrap().model_name(),
            "ollama:llama3"
        );
    }
}

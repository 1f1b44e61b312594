use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse, ModelConfig, TokenStream, Usage};
use crate::error::AnalysisError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct OpenAIAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: OpenAIUsage,
    model: String,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                AnalysisError::Configuration(
                    "OpenAI API key not found. Set OPENAI_API_KEY or provide api_key in config"
                        .to_string(),
                )
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| AnalysisError::Service(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url,
        })
    }

    fn build_body(&self, request: LLMRequest, stream: bool) -> OpenAIRequest {
        let messages = vec![
            Message {
                role: "system".to_string(),
                content: request.system_prompt,
            },
            Message {
                role: "user".to_string(),
                content: request.user_prompt,
            },
        ];

        OpenAIRequest {
            model: self.config.model_name.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream,
        }
    }

    async fn dispatch(&self, body: &OpenAIRequest) -> Result<reqwest::Response, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::from_transport("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::from_status("OpenAI", status, text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, AnalysisError> {
        let body = self.build_body(request, false);
        let response = self.dispatch(&body).await?;

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Service(format!("failed to parse OpenAI response: {}", e)))?;

        let content = openai_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            model: openai_response.model,
            usage: Some(Usage {
                prompt_tokens: openai_response.usage.prompt_tokens,
                completion_tokens: openai_response.usage.completion_tokens,
                total_tokens: openai_response.usage.total_tokens,
            }),
        })
    }

    async fn stream(&self, request: LLMRequest) -> Result<TokenStream, AnalysisError> {
        let body = self.build_body(request, true);
        let response = self.dispatch(&body).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx
                            .send(Err(AnalysisError::from_transport("OpenAI", err)))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let data = match line.trim().strip_prefix("data:") {
                        Some(rest) => rest.trim().to_string(),
                        None => continue,
                    };
                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamChunk>(&data) {
                        Ok(event) => {
                            let text = event
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .unwrap_or_default();
                            if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                // Consumer hung up; dropping the response
                                // closes the connection.
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx
                                .send(Err(AnalysisError::Service(format!(
                                    "failed to parse OpenAI stream event: {}",
                                    err
                                ))))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_for(server: &mockito::ServerGuard) -> OpenAIAdapter {
        let config = ModelConfig {
            model_name: "gpt-4o".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(server.url()),
            temperature: 0.3,
            max_tokens: 1000,
        };
        OpenAIAdapter::new(config).unwrap()
    }

    fn request() -> LLMRequest {
        LLMRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn complete_parses_content_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                r#"{
                    "model": "gpt-4o",
                    "choices": [{"message": {"role": "assistant", "content": "Adds a flag.\nLow risk."}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                }"#,
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let response = adapter.complete(request()).await.unwrap();

        assert_eq!(response.content, "Adds a flag.\nLow risk.");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn status_429_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limit exceeded")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let err = adapter.complete(request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(_)));
    }

    #[tokio::test]
    async fn status_500_maps_to_service_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let err = adapter.complete(request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Service(_)));
    }

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Adds \"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"a flag.\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{}}]}\n\n",
                "data: [DONE]\n\n",
            ))
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let mut tokens = adapter.stream(request()).await.unwrap();

        let mut collected = String::new();
        while let Some(item) = tokens.recv().await {
            collected.push_str(&item.unwrap());
        }
        assert_eq!(collected, "Adds a flag.");
    }

    #[tokio::test]
    async fn stream_dispatch_rate_limit_fails_before_any_fragment() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let err = adapter.stream(request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(_)));
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let config = ModelConfig {
            api_key: None,
            ..ModelConfig::default()
        };
        // Guard against ambient credentials leaking into the test.
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let err = OpenAIAdapter::new(config).unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }
}

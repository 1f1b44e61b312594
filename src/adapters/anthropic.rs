use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse, ModelConfig, TokenStream, Usage};
use crate::error::AnalysisError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub struct AnthropicAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: usize,
    temperature: f32,
    system: String,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct Content {
    text: String,
    #[serde(rename = "type")]
    content_type: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                AnalysisError::Configuration(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY or provide api_key in config"
                        .to_string(),
                )
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());

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

    fn build_body(&self, request: LLMRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model_name.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt,
            }],
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            system: request.system_prompt,
            stream,
        }
    }

    async fn dispatch(&self, body: &AnthropicRequest) -> Result<reqwest::Response, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::from_transport("Anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::from_status("Anthropic", status, text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, AnalysisError> {
        let body = self.build_body(request, false);
        let response = self.dispatch(&body).await?;

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            AnalysisError::Service(format!("failed to parse Anthropic response: {}", e))
        })?;

        let content = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(LLMResponse {
            content,
            model: anthropic_response.model,
            usage: Some(Usage {
                prompt_tokens: anthropic_response.usage.input_tokens,
                completion_tokens: anthropic_response.usage.output_tokens,
                total_tokens: anthropic_response.usage.input_tokens
                    + anthropic_response.usage.output_tokens,
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
                            .send(Err(AnalysisError::from_transport("Anthropic", err)))
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

                    let event: StreamEvent = match serde_json::from_str(&data) {
                        Ok(event) => event,
                        Err(err) => {
                            let _ = tx
                                .send(Err(AnalysisError::Service(format!(
                                    "failed to parse Anthropic stream event: {}",
                                    err
                                ))))
                                .await;
                            return;
                        }
                    };

                    match event.event_type.as_str() {
                        "content_block_delta" => {
                            let text = event
                                .delta
                                .and_then(|d| d.text)
                                .unwrap_or_default();
                            if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        "message_stop" => return,
                        "error" => {
                            let _ = tx
                                .send(Err(AnalysisError::Service(format!(
                                    "Anthropic stream error: {}",
                                    data
                                ))))
                                .await;
                            return;
                        }
                        // ping, message_start, content_block_start, ...
                        _ => {}
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

    fn adapter_for(server: &mockito::ServerGuard) -> AnthropicAdapter {
        let config = ModelConfig {
            model_name: "claude-sonnet-4-5".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(server.url()),
            temperature: 0.3,
            max_tokens: 1000,
        };
        AnthropicAdapter::new(config).unwrap()
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
    async fn complete_joins_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(
                r#"{
                    "model": "claude-sonnet-4-5",
                    "content": [{"type": "text", "text": "Renames a module.\nNo behavior change."}],
                    "usage": {"input_tokens": 12, "output_tokens": 7}
                }"#,
            )
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let response = adapter.complete(request()).await.unwrap();

        assert_eq!(response.content, "Renames a module.\nNo behavior change.");
        assert_eq!(response.usage.unwrap().total_tokens, 19);
    }

    #[tokio::test]
    async fn stream_collects_content_block_deltas() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(concat!(
                "event: message_start\n",
                "data: {\"type\":\"message_start\"}\n\n",
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Renames \"}}\n\n",
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"a module.\"}}\n\n",
                "event: message_stop\n",
                "data: {\"type\":\"message_stop\"}\n\n",
            ))
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let mut tokens = adapter.stream(request()).await.unwrap();

        let mut collected = String::new();
        while let Some(item) = tokens.recv().await {
            collected.push_str(&item.unwrap());
        }
        assert_eq!(collected, "Renames a module.");
    }

    #[tokio::test]
    async fn status_429_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(429)
            .with_body("overloaded")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let err = adapter.complete(request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(_)));
    }
}

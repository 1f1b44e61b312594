use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse, ModelConfig, TokenStream, Usage};
use crate::error::AnalysisError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub struct OllamaAdapter {
    client: Client,
    config: ModelConfig,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    temperature: f32,
    num_predict: usize,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    model: Option<String>,
    done: bool,
    prompt_eval_count: Option<usize>,
    eval_count: Option<usize>,
}

impl OllamaAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, AnalysisError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        // Local models can be slow to first token.
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| AnalysisError::Service(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn build_body(&self, request: LLMRequest, stream: bool) -> OllamaRequest {
        let model_name = self
            .config
            .model_name
            .strip_prefix("ollama:")
            .unwrap_or(&self.config.model_name);

        OllamaRequest {
            model: model_name.to_string(),
            prompt: request.user_prompt,
            system: request.system_prompt,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            num_predict: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream,
        }
    }

    async fn dispatch(&self, body: &OllamaRequest) -> Result<reqwest::Response, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::from_transport("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::from_status("Ollama", status, text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, AnalysisError> {
        let body = self.build_body(request, false);
        let response = self.dispatch(&body).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Service(format!("failed to parse Ollama response: {}", e)))?;

        let usage = if ollama_response.done {
            let prompt = ollama_response.prompt_eval_count.unwrap_or(0);
            let completion = ollama_response.eval_count.unwrap_or(0);
            Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            })
        } else {
            None
        };

        Ok(LLMResponse {
            content: ollama_response.response,
            model: ollama_response
                .model
                .unwrap_or_else(|| self.config.model_name.clone()),
            usage,
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
                            .send(Err(AnalysisError::from_transport("Ollama", err)))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Ollama streams newline-delimited JSON objects.
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<OllamaResponse>(line) {
                        Ok(event) => {
                            if !event.response.is_empty()
                                && tx.send(Ok(event.response)).await.is_err()
                            {
                                return;
                            }
                            if event.done {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx
                                .send(Err(AnalysisError::Service(format!(
                                    "failed to parse Ollama stream event: {}",
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

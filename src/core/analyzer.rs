use crate::adapters::llm::{LLMAdapter, LLMRequest};
use crate::core::diff;
use crate::core::prompt::{PromptBuilder, PromptConfig};
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Placeholder used when the model response carries no text beyond its
/// first line.
pub const IMPACT_FALLBACK: &str = "No additional impact details were provided.";

/// One analysis outcome. Created fresh per call, immutable once built.
///
/// `files_changed` preserves `diff --git` header order; duplicates are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub impact: String,
    pub files_changed: Vec<String>,
}

/// Typed events produced in streaming mode, in order: zero or more
/// `Fragment`s, one `FilesChanged`, then `Done`. Any failure terminates the
/// stream with `Failed` instead.
#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    FilesChanged(Vec<String>),
    Failed(AnalysisError),
    Done,
}

/// Sequential exponential backoff for rate-limited requests: the delay
/// doubles per attempt up to `max_delay`, bounded by `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Diff summarizer: builds the two-role prompt, invokes the completion
/// adapter, and shapes the response into an [`AnalysisResult`] or a typed
/// event stream.
pub struct DiffAnalyzer {
    adapter: Arc<dyn LLMAdapter>,
    prompt: PromptConfig,
    retry: RetryPolicy,
}

impl DiffAnalyzer {
    pub fn new(adapter: Arc<dyn LLMAdapter>, prompt: PromptConfig, retry: RetryPolicy) -> Self {
        Self {
            adapter,
            prompt,
            retry,
        }
    }

    /// Single-shot mode: the finished record, or the first terminal error.
    pub async fn analyze(&self, diff_text: &str) -> Result<AnalysisResult, AnalysisError> {
        if diff::is_blank(diff_text) {
            return Err(AnalysisError::InvalidInput);
        }

        let files_changed = diff::changed_files(diff_text);
        info!(
            model = self.adapter.model_name(),
            diff_bytes = diff_text.len(),
            files = files_changed.len(),
            "starting diff analysis"
        );

        let request = self.build_request(diff_text);
        let adapter = &self.adapter;
        let response =
            with_backoff(&self.retry, || adapter.complete(request.clone())).await?;

        if let Some(usage) = &response.usage {
            debug!(total_tokens = usage.total_tokens, "completion token usage");
        }
        info!(model = %response.model, "diff analysis complete");

        let (summary, impact) = partition_response(&response.content);
        Ok(AnalysisResult {
            summary,
            impact,
            files_changed,
        })
    }

    /// Streaming mode: a finite, one-shot sequence of typed events. The
    /// producer stops as soon as the receiver is dropped, which closes the
    /// underlying network stream.
    pub fn analyze_streaming(&self, diff_text: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let adapter = Arc::clone(&self.adapter);
        let prompt = self.prompt.clone();
        let retry = self.retry;

        tokio::spawn(async move {
            if let Err(err) = run_streaming(adapter, prompt, retry, diff_text, &tx).await {
                warn!(error = %err, "streaming diff analysis failed");
                let _ = tx.send(StreamEvent::Failed(err)).await;
            }
        });

        rx
    }

    fn build_request(&self, diff_text: &str) -> LLMRequest {
        let builder = PromptBuilder::new(self.prompt.clone());
        let (system_prompt, user_prompt) = builder.build_analysis_prompt(diff_text);
        LLMRequest {
            system_prompt,
            user_prompt,
            temperature: None,
            max_tokens: None,
        }
    }
}

async fn run_streaming(
    adapter: Arc<dyn LLMAdapter>,
    prompt: PromptConfig,
    retry: RetryPolicy,
    diff_text: String,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), AnalysisError> {
    if diff::is_blank(&diff_text) {
        return Err(AnalysisError::InvalidInput);
    }

    let files_changed = diff::changed_files(&diff_text);
    info!(
        model = adapter.model_name(),
        files = files_changed.len(),
        "starting streaming diff analysis"
    );

    let builder = PromptBuilder::new(prompt);
    let (system_prompt, user_prompt) = builder.build_analysis_prompt(&diff_text);
    let request = LLMRequest {
        system_prompt,
        user_prompt,
        temperature: None,
        max_tokens: None,
    };

    // Rate limiting surfaces at dispatch, before any fragment exists, so
    // retrying here never replays partial output.
    let mut tokens = with_backoff(&retry, || adapter.stream(request.clone())).await?;

    let mut fragments = 0usize;
    while let Some(item) = tokens.recv().await {
        let text = item?;
        fragments += 1;
        if tx.send(StreamEvent::Fragment(text)).await.is_err() {
            return Ok(());
        }
    }

    info!(fragments, "model output complete");

    if tx
        .send(StreamEvent::FilesChanged(files_changed))
        .await
        .is_err()
    {
        return Ok(());
    }
    let _ = tx.send(StreamEvent::Done).await;
    Ok(())
}

async fn with_backoff<T, Fut, F>(policy: &RetryPolicy, mut op: F) -> Result<T, AnalysisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnalysisError>>,
{
    let mut attempt = 0usize;
    let mut delay = policy.base_delay;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(AnalysisError::RateLimited(reason)) if attempt < policy.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited: {}; backing off",
                    reason
                );
                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

fn partition_response(content: &str) -> (String, String) {
    match content.split_once('\n') {
        Some((first, rest)) if !rest.is_empty() => (first.to_string(), rest.to_string()),
        Some((first, _)) => (first.to_string(), IMPACT_FALLBACK.to_string()),
        None => (content.to_string(), IMPACT_FALLBACK.to_string()),
    }
}

//! Deterministic mock LLM client for agent and compaction tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};
use crate::protocol::PromptUsage;

use super::{CompletionRequest, CompletionResponse, FinishReason, LlmClient};

/// Deterministic step for scripted mock completions.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    /// Return a plain assistant message.
    Text(String),
    /// Return a response cut off by the output token limit.
    Truncated(String),
    /// Return an LLM error.
    Error(String),
    /// Return an HTTP 429.
    RateLimit,
    /// Return a transport failure.
    ConnectionError,
    /// Return a timeout-like error after optional delay.
    Timeout,
}

/// Scripted completion step with optional delay.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn truncated(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Truncated(content.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Error(message.into()),
        }
    }

    pub fn rate_limit() -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::RateLimit,
        }
    }

    pub fn connection_error() -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::ConnectionError,
        }
    }

    pub fn timeout(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            kind: MockStepKind::Timeout,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic mock LLM client driven by scripted steps.
///
/// Every request is recorded so tests can assert on the prompts an agent
/// produced.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    /// Requests received so far, oldest first.
    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining_steps(&self) -> usize {
        self.script.lock().await.len()
    }

    async fn next_step(&self) -> Option<MockStep> {
        self.script.lock().await.pop_front()
    }

    fn usage_for(request: &CompletionRequest, content_len: usize) -> PromptUsage {
        let prompt_tokens = request.system_prompt.len().div_ceil(4) as u32;
        let completion_tokens = content_len.div_ceil(4) as u32;
        PromptUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    fn fallback_response(request: &CompletionRequest) -> CompletionResponse {
        let text = "mock-ok".to_string();
        CompletionResponse {
            usage: Some(Self::usage_for(request, text.len())),
            content: Some(text),
            finish_reason: FinishReason::Stop,
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().await.push(request.clone());

        let step = self.next_step().await;
        let Some(step) = step else {
            return Ok(Self::fallback_response(&request));
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Text(content) => Ok(CompletionResponse {
                usage: Some(Self::usage_for(&request, content.len())),
                content: Some(content),
                finish_reason: FinishReason::Stop,
            }),
            MockStepKind::Truncated(content) => Ok(CompletionResponse {
                usage: Some(Self::usage_for(&request, content.len())),
                content: Some(content),
                finish_reason: FinishReason::Length,
            }),
            MockStepKind::Error(message) => Err(AiError::Llm(message)),
            MockStepKind::RateLimit => Err(AiError::LlmHttp {
                provider: "mock".to_string(),
                status: 429,
                message: "mock rate limit".to_string(),
                retry_after_secs: None,
            }),
            MockStepKind::ConnectionError => {
                Err(AiError::Llm("mock connection error".to_string()))
            }
            MockStepKind::Timeout => Err(AiError::Llm("mock timeout".to_string())),
        }
    }
}

//! Model client seam
//!
//! Agent prompts are sent as one system message with a bounded completion,
//! so the request carries exactly that and nothing of a chat transcript.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::PromptUsage;

/// One prompt to complete.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_tokens,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Why the model stopped producing tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// The completion hit `max_tokens`.
    Length,
    Other(String),
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason`; a missing one means a normal stop.
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    /// Absent when the provider does not report usage.
    pub usage: Option<PromptUsage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model id, as sent to the provider.
    fn model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

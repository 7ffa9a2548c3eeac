//! One bounded model call with a typed outcome.
//!
//! Callers never see an `AiError` from here: every failure is classified
//! into a [`PromptFailure`] carrying a short error id that is also logged,
//! so a step output can be correlated with the log line that explains it.

use std::fmt;

use crate::llm::extract::{ExtractedJson, extract_json};
use crate::llm::{CompletionRequest, FinishReason, LlmClient};
use crate::prompt::BuiltPrompt;
use crate::protocol::{PromptUsage, short_id};
use crate::text_utils::preview;

#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Label for logs, e.g. "default (step) sim=..., agent=...".
    pub label: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Text the prompt ended with that the model is expected to continue.
    pub completion_prefix: Option<String>,
}

impl PromptOptions {
    pub fn new(label: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            label: label.into(),
            max_output_tokens,
            temperature: 0.0,
            completion_prefix: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_completion_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.completion_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSuccess {
    pub response_text: String,
    pub usage: PromptUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptFailure {
    RateLimited {
        error_id: String,
    },
    ConnectionError {
        error_id: String,
    },
    LengthLimit {
        error_id: String,
        usage: PromptUsage,
    },
    ResponseParseError {
        error_id: String,
        usage: PromptUsage,
        message: String,
    },
    UnknownApiError {
        error_id: String,
        message: String,
    },
}

impl PromptFailure {
    pub fn error_id(&self) -> &str {
        match self {
            PromptFailure::RateLimited { error_id }
            | PromptFailure::ConnectionError { error_id }
            | PromptFailure::LengthLimit { error_id, .. }
            | PromptFailure::ResponseParseError { error_id, .. }
            | PromptFailure::UnknownApiError { error_id, .. } => error_id,
        }
    }

    /// Usage billed even though the call failed.
    pub fn usage(&self) -> Option<PromptUsage> {
        match self {
            PromptFailure::LengthLimit { usage, .. }
            | PromptFailure::ResponseParseError { usage, .. } => Some(*usage),
            _ => None,
        }
    }

    /// Whether the caller should slow down before the next attempt.
    pub fn should_back_off(&self) -> bool {
        matches!(
            self,
            PromptFailure::RateLimited { .. } | PromptFailure::ConnectionError { .. }
        )
    }
}

impl fmt::Display for PromptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptFailure::RateLimited { error_id } => {
                write!(f, "Rate limit error running agent prompt (errorId = {error_id})")
            }
            PromptFailure::ConnectionError { error_id } => {
                write!(f, "Connection error running agent prompt (errorId = {error_id})")
            }
            PromptFailure::LengthLimit { error_id, .. } => {
                write!(f, "Prompt exceeded max length (errorId = {error_id})")
            }
            PromptFailure::ResponseParseError { error_id, .. } => {
                write!(f, "Failed to parse json of prompt output (errorId = {error_id})")
            }
            PromptFailure::UnknownApiError { error_id, message } => {
                write!(f, "Unknown prompt API error (errorId = {error_id}): {message}")
            }
        }
    }
}

/// Send `prompt` as a single system message and classify the result.
pub async fn run_prompt(
    client: &dyn LlmClient,
    prompt: &BuiltPrompt,
    options: &PromptOptions,
) -> Result<PromptSuccess, PromptFailure> {
    tracing::info!(
        label = %options.label,
        model = client.model(),
        prompt_tokens = prompt.total_tokens,
        "Running prompt"
    );
    tracing::debug!(label = %options.label, prompt = %prompt.text, "Prompt text");

    let request = CompletionRequest::new(prompt.text.clone(), options.max_output_tokens)
        .with_temperature(options.temperature);

    let response = match client.complete(request).await {
        Ok(response) => response,
        Err(error) => {
            let error_id = short_id();
            let failure = if error.is_rate_limit() {
                PromptFailure::RateLimited { error_id }
            } else if error.is_connection_error() {
                PromptFailure::ConnectionError { error_id }
            } else if error.is_context_length() {
                PromptFailure::LengthLimit {
                    error_id,
                    usage: PromptUsage::default(),
                }
            } else {
                PromptFailure::UnknownApiError {
                    error_id,
                    message: error.to_string(),
                }
            };
            tracing::warn!(
                label = %options.label,
                error_id = failure.error_id(),
                error = %error,
                "Prompt call failed"
            );
            return Err(failure);
        }
    };

    let usage = response.usage.unwrap_or_default();
    let content = response.content.unwrap_or_default();

    if response.finish_reason == FinishReason::Length {
        let error_id = short_id();
        tracing::warn!(
            label = %options.label,
            error_id = %error_id,
            approximate_input_tokens = prompt.total_tokens,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            response = %preview(&content, 500),
            "Completion ended from max length"
        );
        return Err(PromptFailure::LengthLimit { error_id, usage });
    }

    let response_text = match &options.completion_prefix {
        Some(prefix) => format!("{prefix}{content}"),
        None => content,
    };

    tracing::debug!(
        label = %options.label,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        response = %response_text,
        "Prompt response"
    );

    Ok(PromptSuccess {
        response_text,
        usage,
    })
}

/// [`run_prompt`] followed by JSON extraction of the response.
pub async fn run_json_prompt(
    client: &dyn LlmClient,
    prompt: &BuiltPrompt,
    options: &PromptOptions,
) -> Result<(PromptSuccess, ExtractedJson), PromptFailure> {
    let success = run_prompt(client, prompt, options).await?;
    match extract_json(&success.response_text) {
        Ok(extracted) => Ok((success, extracted)),
        Err(error) => {
            let error_id = short_id();
            tracing::warn!(
                label = %options.label,
                error_id = %error_id,
                error = %error,
                response = %preview(&success.response_text, 500),
                "Failed to parse JSON from prompt response"
            );
            Err(PromptFailure::ResponseParseError {
                error_id,
                usage: success.usage,
                message: error.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockStep};

    fn prompt() -> BuiltPrompt {
        BuiltPrompt {
            text: "## PROMPT\nrespond".to_string(),
            total_tokens: 5,
            usage: String::new(),
        }
    }

    #[tokio::test]
    async fn test_success_applies_completion_prefix() {
        let client = MockLlmClient::from_steps("m", vec![MockStep::text("\"a\": 1}")]);
        let options = PromptOptions::new("test", 100).with_completion_prefix("{");
        let success = run_prompt(&client, &prompt(), &options).await.unwrap();
        assert_eq!(success.response_text, "{\"a\": 1}");

        let request = &client.recorded_requests().await[0];
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.system_prompt, "## PROMPT\nrespond");
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![
                MockStep::rate_limit(),
                MockStep::connection_error(),
                MockStep::truncated("partial"),
                MockStep::error("boom"),
            ],
        );
        let options = PromptOptions::new("test", 100);

        let rate = run_prompt(&client, &prompt(), &options).await.unwrap_err();
        assert!(matches!(rate, PromptFailure::RateLimited { .. }));
        assert!(rate.should_back_off());

        let conn = run_prompt(&client, &prompt(), &options).await.unwrap_err();
        assert!(matches!(conn, PromptFailure::ConnectionError { .. }));

        let length = run_prompt(&client, &prompt(), &options).await.unwrap_err();
        assert!(matches!(length, PromptFailure::LengthLimit { .. }));
        assert!(length.usage().is_some());

        let unknown = run_prompt(&client, &prompt(), &options).await.unwrap_err();
        assert!(matches!(unknown, PromptFailure::UnknownApiError { .. }));
        assert!(!unknown.should_back_off());
        assert_eq!(unknown.error_id().len(), 8);
    }

    #[tokio::test]
    async fn test_json_prompt_parse_error_keeps_usage() {
        let client = MockLlmClient::from_steps("m", vec![MockStep::text("I refuse")]);
        let failure = run_json_prompt(&client, &prompt(), &PromptOptions::new("t", 10))
            .await
            .unwrap_err();
        assert!(matches!(failure, PromptFailure::ResponseParseError { .. }));
        assert!(failure.to_string().contains("Failed to parse json"));
    }

    #[tokio::test]
    async fn test_json_prompt_success() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![MockStep::text("ok {\"facialExpressionEmoji\": \"😀\"}")],
        );
        let (success, extracted) =
            run_json_prompt(&client, &prompt(), &PromptOptions::new("t", 10))
                .await
                .unwrap();
        assert_eq!(extracted.text_before, "ok");
        assert_eq!(extracted.json["facialExpressionEmoji"], "😀");
        assert!(success.usage.total_tokens > 0);
    }
}

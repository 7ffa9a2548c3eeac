//! Error types for the agent runtime

use thiserror::Error;

use crate::prompt::PromptError;

/// Agent runtime error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} API error (status {status}): {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Whether the request that produced this error is worth sending again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            AiError::Http(error) => error.is_timeout() || error.is_connect() || error.is_request(),
            AiError::Llm(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("rate limit") || lower.contains("timeout")
            }
            _ => false,
        }
    }

    /// Server-provided backoff, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AiError::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => *status == 429,
            AiError::Llm(message) => message.to_ascii_lowercase().contains("rate limit"),
            _ => false,
        }
    }

    /// Transport failures and timeouts, as opposed to API-level rejections.
    pub fn is_connection_error(&self) -> bool {
        match self {
            AiError::Http(error) => error.is_timeout() || error.is_connect() || error.is_request(),
            AiError::LlmHttp { status, .. } => matches!(status, 502..=504),
            AiError::Llm(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("timeout") || lower.contains("connection")
            }
            _ => false,
        }
    }

    /// The request exceeded the model's context window.
    pub fn is_context_length(&self) -> bool {
        match self {
            AiError::LlmHttp {
                status, message, ..
            } => {
                *status == 400
                    && (message.contains("context_length_exceeded")
                        || message.contains("maximum context length"))
            }
            _ => false,
        }
    }
}

/// Result type alias for agent runtime operations
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, message: &str) -> AiError {
        AiError::LlmHttp {
            provider: "Test".to_string(),
            status,
            message: message.to_string(),
            retry_after_secs: None,
        }
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(http(429, "slow down").is_retryable());
        assert!(http(429, "slow down").is_rate_limit());
        assert!(!http(401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_gateway_errors_are_connection_errors() {
        assert!(http(503, "unavailable").is_connection_error());
        assert!(!http(500, "boom").is_connection_error());
        assert!(http(500, "boom").is_retryable());
    }

    #[test]
    fn test_context_length_detection() {
        let error = http(
            400,
            r#"{"error":{"code":"context_length_exceeded","message":"too long"}}"#,
        );
        assert!(error.is_context_length());
        assert!(!http(400, "bad request").is_context_length());
    }

    #[test]
    fn test_llm_string_fallback() {
        assert!(AiError::Llm("rate limit".to_string()).is_rate_limit());
        assert!(AiError::Llm("mock timeout".to_string()).is_connection_error());
        assert!(!AiError::Llm("bad request".to_string()).is_retryable());
    }
}

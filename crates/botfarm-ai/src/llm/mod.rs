//! LLM module - model client abstraction and prompt execution

mod client;
pub mod extract;
mod mock_client;
mod model_info;
mod openai;
pub mod retry;
mod runner;

pub use client::{CompletionRequest, CompletionResponse, FinishReason, LlmClient};
pub use extract::{ExtractedJson, extract_json, extract_script};
pub use mock_client::{MockLlmClient, MockStep, MockStepKind};
pub use model_info::{DEFAULT_MAX_TOKEN_COUNT, ModelInfo};
pub use openai::OpenAIClient;
pub use retry::LlmRetryConfig;
pub use runner::{
    PromptFailure, PromptOptions, PromptSuccess, run_json_prompt, run_prompt,
};

//! Botfarm AI - LLM-driven agents for a shared simulated world
//!
//! This crate provides:
//! - Token-budgeted prompt assembly with per-section reservations
//! - Per-agent activity memory with LLM-driven compaction
//! - Two agent kinds: JSON-action agents and scripted agents
//! - An action bridge that lets a running script wait on simulation results
//! - A runner that keeps one worker per agent and batches its inputs

pub mod agent;
pub mod bridge;
pub mod error;
mod http_client;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod protocol;
pub mod runner;
pub mod script;
mod text_utils;
pub mod token;

// Re-export commonly used types
pub use agent::{
    Agent, AgentConfig, AgentContext, AgentKind, CadencePolicy, DefaultAgent, PromptCadence,
    ScriptedAgent, StepPhase, create_agent,
};
pub use bridge::{ActionBridge, AgentMailbox, BridgeConfig, BridgeError, CancelToken};
pub use error::{AiError, Result};
pub use llm::{
    LlmClient, LlmRetryConfig, MockLlmClient, MockStep, ModelInfo, OpenAIClient, PromptFailure,
    PromptOptions,
};
pub use memory::{CompactionConfig, LongTermRetention, MemoryState};
pub use prompt::{BuiltPrompt, PromptBuilder, PromptError};
pub use protocol::{StepInput, StepOutput};
pub use runner::{AgentContainer, RunnerConfig};
pub use token::{HeuristicCounter, TiktokenCounter, TokenCounter, counter_for_model};

//! Agent module - per-agent step loop over memory, prompts and actions
//!
//! Two kinds of agent share the same step skeleton (see [`StepPhase`]):
//! - [`DefaultAgent`] asks the model for one JSON object per prompt and
//!   turns its keys into actions;
//! - [`ScriptedAgent`] asks for a program and runs it on a blocking
//!   thread, one action at a time, through the action bridge.
//!
//! Agents never return outputs directly. Everything they produce is queued
//! on their [`AgentMailbox`] and drained by the runner.

mod common;
mod default_agent;
mod entities;
mod response;
pub mod scheduler;
mod scripted_agent;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bridge::{AgentMailbox, BridgeConfig};
use crate::error::{AiError, Result};
use crate::llm::{LlmClient, ModelInfo};
use crate::memory::{CompactionConfig, LongTermRetention};
use crate::protocol::StepInput;
use crate::token::TokenCounter;

pub use default_agent::DefaultAgent;
pub use entities::{
    GroupedEntities, entity_state_json, entity_variable_name, grouped_observed_entities,
    sorted_observed_entities,
};
pub use response::{AgentResponse, response_actions};
pub use scheduler::{CadencePolicy, PromptCadence, StepPhase, StepScheduler};
pub use scripted_agent::ScriptedAgent;

/// Tunables shared by both agent kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub compaction: CompactionConfig,
    pub retention: LongTermRetention,
    pub bridge: BridgeConfig,
    pub cadence: PromptCadence,
    /// Completion budget of a step prompt.
    pub completion_max_tokens: usize,
    pub temperature: f32,
    /// How long a superseded script gets to unwind before it is abandoned.
    pub script_shutdown_grace_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            compaction: CompactionConfig::default(),
            retention: LongTermRetention::default(),
            bridge: BridgeConfig::default(),
            cadence: PromptCadence::default(),
            completion_max_tokens: 500,
            temperature: 0.0,
            script_shutdown_grace_ms: 5_000,
        }
    }
}

/// Everything an agent needs from its host.
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn LlmClient>,
    pub model: ModelInfo,
    pub counter: Arc<dyn TokenCounter>,
    pub config: AgentConfig,
}

impl AgentContext {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelInfo, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            llm,
            model,
            counter,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Default,
    Scripted,
}

impl FromStr for AgentKind {
    type Err = AiError;

    /// Agent types are matched by prefix, so variants such as
    /// `scripted-gpt4` select their family.
    fn from_str(agent_type: &str) -> Result<Self> {
        if agent_type.starts_with("default") {
            Ok(AgentKind::Default)
        } else if agent_type.starts_with("scripted") {
            Ok(AgentKind::Scripted)
        } else {
            Err(AiError::Agent(format!("Unknown agent type: {agent_type}")))
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Default => f.write_str("default"),
            AgentKind::Scripted => f.write_str("scripted"),
        }
    }
}

#[async_trait]
pub trait Agent: Send {
    /// Fold one input's observations into agent state. Runs for every
    /// input, including ones that are not stepped on.
    async fn consume_input(&mut self, input: &StepInput) -> Result<()>;

    /// Run one step against the latest input.
    async fn step(&mut self, input: &StepInput) -> Result<()>;

    /// Release anything running on the agent's behalf.
    async fn shutdown(&mut self) {}
}

pub fn create_agent(
    kind: AgentKind,
    context: AgentContext,
    mailbox: Arc<AgentMailbox>,
) -> Box<dyn Agent> {
    match kind {
        AgentKind::Default => Box::new(DefaultAgent::new(context, mailbox)),
        AgentKind::Scripted => Box::new(ScriptedAgent::new(context, mailbox)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_from_prefix() {
        assert_eq!("default".parse::<AgentKind>().unwrap(), AgentKind::Default);
        assert_eq!(
            "scripted-gpt4".parse::<AgentKind>().unwrap(),
            AgentKind::Scripted
        );
        let error = "puppet".parse::<AgentKind>().unwrap_err();
        assert!(error.to_string().contains("Unknown agent type: puppet"));
    }

    #[test]
    fn test_config_defaults_from_partial_toml_like_json() {
        let config: AgentConfig =
            serde_json::from_value(serde_json::json!({"completion_max_tokens": 800})).unwrap();
        assert_eq!(config.completion_max_tokens, 800);
        assert_eq!(config.script_shutdown_grace_ms, 5_000);
        assert_eq!(config.cadence, PromptCadence::default());
    }
}

//! Configuration file support
//!
//! Loads configuration from ~/.config/botfarm/config.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use botfarm_ai::{
    AgentConfig, BridgeConfig, CompactionConfig, LongTermRetention, PromptCadence, RunnerConfig,
};
use serde::{Deserialize, Serialize};

const API_KEY_ENV_VARS: [&str; 2] = ["BOTFARM_OPENAI_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotfarmConfig {
    pub model: ModelConfig,
    pub memory: MemoryConfig,
    pub bridge: BridgeConfig,
    pub cadence: PromptCadence,
    pub runner: RunnerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub id: String,
    /// OpenAI-compatible endpoint; the public API when unset
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    #[serde(flatten)]
    pub compaction: CompactionConfig,
    pub retention: LongTermRetention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub step_delay_ms: u64,
    pub script_shutdown_grace_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            step_delay_ms: RunnerConfig::default().step_delay_ms,
            script_shutdown_grace_ms: AgentConfig::default().script_shutdown_grace_ms,
        }
    }
}

impl BotfarmConfig {
    /// Load from `path`, or from the default location when `None`. A
    /// missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_path(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("botfarm").join("config.toml"))
    }

    /// The configured key, else the first key found in the environment.
    pub fn api_key(&self) -> Option<String> {
        self.model.api_key.clone().or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .find_map(|name| std::env::var(name).ok())
                .filter(|key| !key.trim().is_empty())
        })
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            compaction: self.memory.compaction.clone(),
            retention: self.memory.retention,
            bridge: self.bridge.clone(),
            cadence: self.cadence.clone(),
            temperature: self.model.temperature,
            script_shutdown_grace_ms: self.runner.script_shutdown_grace_ms,
            ..AgentConfig::default()
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            step_delay_ms: self.runner.step_delay_ms,
        }
    }
}

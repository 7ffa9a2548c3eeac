use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "botfarm")]
#[command(version, about = "Botfarm - LLM-driven agents for simulated worlds")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/botfarm/config.toml)
    #[arg(long, global = true, env = "BOTFARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Model id, overriding the config file
    #[arg(long, global = true, env = "BOTFARM_MODEL")]
    pub model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Output format (replay defaults to json, everything else to text)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Feed recorded step inputs through agents and print their outputs
    Replay(ReplayArgs),

    /// Show how the prompt budget is spent for a recorded input
    Budget(BudgetArgs),

    /// List known models with context size and pricing
    Models,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Recorded inputs: a JSON array, a single JSON object, or JSON lines
    pub inputs: PathBuf,

    /// Replace the agent type of every input
    #[arg(long)]
    pub agent_type: Option<String>,

    /// Answer prompts from these files in order instead of calling the model
    #[arg(long = "mock-response", value_name = "FILE")]
    pub mock_responses: Vec<PathBuf>,

    /// API key for the model provider
    #[arg(long, env = "BOTFARM_OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Report every requested action back as started and succeeded
    #[arg(long)]
    pub ack_actions: bool,

    /// Milliseconds without new output after which an input counts as done
    #[arg(long, default_value_t = 500)]
    pub settle_ms: u64,
}

#[derive(Args)]
pub struct BudgetArgs {
    /// Recorded inputs; only the first one is used
    pub inputs: PathBuf,

    /// Replace the agent type of the input
    #[arg(long)]
    pub agent_type: Option<String>,

    /// Also print the full prompt text
    #[arg(long)]
    pub show_prompt: bool,
}

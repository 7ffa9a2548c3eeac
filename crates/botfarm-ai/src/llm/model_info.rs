//! Context window sizes and pricing for supported models.

use serde::{Deserialize, Serialize};

use crate::protocol::{ModelUsagePricing, PromptUsage, PromptUsageInfo};

/// Context size assumed for models missing from the table.
pub const DEFAULT_MAX_TOKEN_COUNT: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    /// USD per 1k prompt tokens.
    pub cost_per_1k_input: f64,
    /// USD per 1k completion tokens.
    pub cost_per_1k_output: f64,
    /// Context window (prompt plus completion).
    pub max_token_count: usize,
}

struct KnownModel {
    prefix: &'static str,
    cost_per_1k_input: f64,
    cost_per_1k_output: f64,
    max_token_count: usize,
}

// Longest prefixes first so "gpt-4-32k" does not resolve to "gpt-4".
const KNOWN_MODELS: &[KnownModel] = &[
    KnownModel {
        prefix: "gpt-3.5-turbo-16k",
        cost_per_1k_input: 0.003,
        cost_per_1k_output: 0.004,
        max_token_count: 16_384,
    },
    KnownModel {
        prefix: "gpt-3.5-turbo",
        cost_per_1k_input: 0.0015,
        cost_per_1k_output: 0.002,
        max_token_count: 4_096,
    },
    KnownModel {
        prefix: "gpt-4o-mini",
        cost_per_1k_input: 0.000_15,
        cost_per_1k_output: 0.000_6,
        max_token_count: 128_000,
    },
    KnownModel {
        prefix: "gpt-4o",
        cost_per_1k_input: 0.002_5,
        cost_per_1k_output: 0.01,
        max_token_count: 128_000,
    },
    KnownModel {
        prefix: "gpt-4-turbo",
        cost_per_1k_input: 0.01,
        cost_per_1k_output: 0.03,
        max_token_count: 128_000,
    },
    KnownModel {
        prefix: "gpt-4-32k",
        cost_per_1k_input: 0.06,
        cost_per_1k_output: 0.12,
        max_token_count: 32_768,
    },
    KnownModel {
        prefix: "gpt-4",
        cost_per_1k_input: 0.03,
        cost_per_1k_output: 0.06,
        max_token_count: 8_192,
    },
];

impl ModelInfo {
    /// Resolve a model id against the known table by prefix, so dated
    /// snapshots ("gpt-4-0613") inherit their family's limits.
    pub fn lookup(model_id: &str) -> Self {
        let normalized = model_id.trim().to_ascii_lowercase();
        match KNOWN_MODELS
            .iter()
            .find(|known| normalized.starts_with(known.prefix))
        {
            Some(known) => Self {
                model_id: model_id.to_string(),
                cost_per_1k_input: known.cost_per_1k_input,
                cost_per_1k_output: known.cost_per_1k_output,
                max_token_count: known.max_token_count,
            },
            None => Self {
                model_id: model_id.to_string(),
                cost_per_1k_input: 0.0,
                cost_per_1k_output: 0.0,
                max_token_count: DEFAULT_MAX_TOKEN_COUNT,
            },
        }
    }

    /// Every model in the table, for listings.
    pub fn known() -> Vec<Self> {
        KNOWN_MODELS
            .iter()
            .map(|known| Self::lookup(known.prefix))
            .collect()
    }

    pub fn with_max_token_count(mut self, max_token_count: usize) -> Self {
        self.max_token_count = max_token_count;
        self
    }

    pub fn pricing(&self) -> ModelUsagePricing {
        ModelUsagePricing {
            model_id: self.model_id.clone(),
            cost_per_1k_input: self.cost_per_1k_input,
            cost_per_1k_output: self.cost_per_1k_output,
        }
    }

    pub fn usage_info(&self, usage: PromptUsage) -> PromptUsageInfo {
        PromptUsageInfo {
            usage,
            model_usage_pricing: self.pricing(),
        }
    }

    /// Estimated USD cost of one call.
    pub fn cost(&self, usage: &PromptUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.cost_per_1k_input
            + (usage.completion_tokens as f64 / 1000.0) * self.cost_per_1k_output
    }

    /// Estimated USD cost of sending `prompt_tokens` of input.
    pub fn input_cost(&self, prompt_tokens: usize) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.cost_per_1k_input
    }
}

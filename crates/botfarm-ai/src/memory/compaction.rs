//! Folding old activity into the short-term summary.
//!
//! A pass first plans a partition of the automatic log (see
//! [`plan_compaction`]) and only touches [`MemoryState`] after the model
//! call has produced a usable summary. Any failure leaves the state exactly
//! as it was.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, ModelInfo, PromptFailure, PromptOptions, run_prompt};
use crate::memory::{AutomaticShortTermMemory, MemoryState};
use crate::prompt::{BuiltPrompt, LineKind, PromptBuilder, PromptError, add_general_info};
use crate::protocol::{
    AgentStatus, PromptUsageInfo, StepInput, StepOutput, short_id, unix_time_seconds,
};
use crate::text_utils::single_line;
use crate::token::TokenCounter;

pub const COMPACTION_INSTRUCTIONS: &str = include_str!("templates/compaction_instructions.md");

/// Compaction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Log size (tokens) at which a pass runs.
    pub trigger_tokens: usize,
    /// Newest entries up to this many tokens stay verbatim.
    pub protected_tokens: usize,
    /// Entries at least this many simulation seconds old are never protected.
    pub protected_max_age: f64,
    /// Most activity tokens folded into one summary.
    pub summarize_tokens: usize,
    /// Length the model is asked to keep its summary under.
    pub suggested_summary_tokens: usize,
    /// Completion budget for the summary call.
    pub reserved_response_tokens: usize,
    /// Shorter summaries are rejected.
    pub min_summary_chars: usize,
    /// Upper bound on passes per step.
    pub max_passes: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            trigger_tokens: 1_000,
            protected_tokens: 500,
            protected_max_age: 60.0,
            summarize_tokens: 2_000,
            suggested_summary_tokens: 900,
            reserved_response_tokens: 1_000,
            min_summary_chars: 5,
            max_passes: 4,
        }
    }
}

/// Partition of the automatic log, as indices in log order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionPlan {
    /// Kept verbatim.
    pub protected: Vec<usize>,
    /// Folded into the new summary.
    pub summarize: Vec<usize>,
    /// Over this pass's summarize budget; left for a later pass.
    pub deferred: Vec<usize>,
}

impl CompactionPlan {
    /// Entries that survive a successful pass, in log order.
    pub fn kept(&self, log: &[AutomaticShortTermMemory]) -> Vec<AutomaticShortTermMemory> {
        let mut indices: Vec<usize> = self
            .protected
            .iter()
            .chain(self.deferred.iter())
            .copied()
            .collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| log[i].clone()).collect()
    }
}

/// Decide what a compaction pass would do with `log` at time `now`.
///
/// Returns `None` when the log is under the trigger threshold or nothing
/// is eligible for summarization.
pub fn plan_compaction(
    log: &[AutomaticShortTermMemory],
    now: f64,
    config: &CompactionConfig,
    counter: &dyn TokenCounter,
) -> Option<CompactionPlan> {
    let costs: Vec<usize> = log.iter().map(|entry| counter.count(&entry.summary)).collect();

    let mut trailing = 0;
    let triggered = costs.iter().rev().any(|cost| {
        trailing += cost;
        trailing >= config.trigger_tokens
    });
    if !triggered {
        return None;
    }

    let mut protected = vec![false; log.len()];
    let mut kept_tokens = 0;
    for (index, cost) in costs.iter().enumerate().rev() {
        if kept_tokens + cost > config.protected_tokens {
            break;
        }
        kept_tokens += cost;
        protected[index] = true;
    }
    for (index, entry) in log.iter().enumerate() {
        if now - entry.time >= config.protected_max_age {
            protected[index] = false;
        }
    }

    // The oldest eligible entry is always queued, even past the summarize
    // budget, so an oversized entry cannot stall compaction forever.
    let mut plan = CompactionPlan::default();
    let mut summarize_tokens = 0;
    let mut overflowed = false;
    for (index, cost) in costs.iter().enumerate() {
        if protected[index] {
            plan.protected.push(index);
        } else if !overflowed
            && (summarize_tokens + cost <= config.summarize_tokens || plan.summarize.is_empty())
        {
            summarize_tokens += cost;
            plan.summarize.push(index);
        } else {
            overflowed = true;
            plan.deferred.push(index);
        }
    }

    if plan.summarize.is_empty() {
        None
    } else {
        Some(plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompactionOutcome {
    Success {
        usage: PromptUsageInfo,
        summarized: usize,
    },
    Skip,
    RateLimited {
        error_id: String,
    },
    ConnectionError {
        error_id: String,
    },
    LengthLimit {
        error_id: String,
    },
    PromptError {
        error_id: String,
        message: String,
    },
}

/// What the compaction loop of one step produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionReport {
    pub usages: Vec<PromptUsageInfo>,
    pub errors: Vec<String>,
    pub was_rate_limited: bool,
}

pub struct MemoryCompactor {
    config: CompactionConfig,
    llm: Arc<dyn LlmClient>,
    model: ModelInfo,
    counter: Arc<dyn TokenCounter>,
}

impl MemoryCompactor {
    pub fn new(
        config: CompactionConfig,
        llm: Arc<dyn LlmClient>,
        model: ModelInfo,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            config,
            llm,
            model,
            counter,
        }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Run one pass.
    pub async fn compact(
        &self,
        state: &mut MemoryState,
        input: &StepInput,
        emit: &(dyn Fn(StepOutput) + Send + Sync),
    ) -> CompactionOutcome {
        let Some(plan) = plan_compaction(
            state.automatic(),
            input.simulation_time,
            &self.config,
            self.counter.as_ref(),
        ) else {
            return CompactionOutcome::Skip;
        };

        let prompt = match self.build_prompt(state, input, &plan) {
            Ok(prompt) => prompt,
            Err(error) => {
                let error_id = short_id();
                tracing::warn!(
                    agent_id = %input.agent_id,
                    error_id = %error_id,
                    error = %error,
                    "Failed to build memory update prompt"
                );
                return CompactionOutcome::PromptError {
                    error_id,
                    message: error.to_string(),
                };
            }
        };

        tracing::debug!(
            agent_id = %input.agent_id,
            protected = plan.protected.len(),
            summarize = plan.summarize.len(),
            deferred = plan.deferred.len(),
            "Running memory update"
        );

        let start_time = unix_time_seconds();
        emit(
            StepOutput::status(AgentStatus::UpdatingMemory, start_time)
                .with_debug_info(format!("Previous memory:\n{}", state.short_term_summary())),
        );

        let options = PromptOptions::new(
            format!(
                "{} (update memory) sim={}, agent={}, step={}",
                input.agent_type, input.simulation_id, input.agent_id, input.step_id
            ),
            self.config.reserved_response_tokens as u32,
        );

        let success = match run_prompt(self.llm.as_ref(), &prompt, &options).await {
            Ok(success) => success,
            Err(failure) => return failure_outcome(failure),
        };

        let summary = success.response_text.trim().to_string();
        if summary.chars().count() < self.config.min_summary_chars {
            let error_id = short_id();
            tracing::warn!(
                agent_id = %input.agent_id,
                error_id = %error_id,
                summary = %summary,
                "Very short short-term memory returned by model"
            );
            return CompactionOutcome::PromptError {
                error_id,
                message: format!("summary too short: {summary:?}"),
            };
        }

        let kept = plan.kept(state.automatic());
        state.replace_after_compaction(kept, summary.clone());

        emit(
            StepOutput::status(AgentStatus::UpdateMemorySuccess, start_time)
                .with_duration(unix_time_seconds() - start_time)
                .with_debug_info(format!("New memory:\n{summary}")),
        );

        CompactionOutcome::Success {
            usage: self.model.usage_info(success.usage),
            summarized: plan.summarize.len(),
        }
    }

    /// Repeat passes until one skips or fails.
    pub async fn compact_until_settled(
        &self,
        state: &mut MemoryState,
        input: &StepInput,
        emit: &(dyn Fn(StepOutput) + Send + Sync),
    ) -> CompactionReport {
        let mut report = CompactionReport::default();
        for _ in 0..self.config.max_passes {
            match self.compact(state, input, emit).await {
                CompactionOutcome::Success { usage, .. } => report.usages.push(usage),
                CompactionOutcome::Skip => break,
                CompactionOutcome::RateLimited { error_id } => {
                    report.was_rate_limited = true;
                    report
                        .errors
                        .push(format!("Memory update prompt rate limited: {error_id}"));
                    break;
                }
                CompactionOutcome::ConnectionError { error_id } => {
                    report.was_rate_limited = true;
                    report
                        .errors
                        .push(format!("Memory update prompt connection error: {error_id}"));
                    break;
                }
                CompactionOutcome::LengthLimit { error_id } => {
                    report
                        .errors
                        .push(format!("Memory update prompt length limited: {error_id}"));
                    break;
                }
                CompactionOutcome::PromptError { error_id, .. } => {
                    report
                        .errors
                        .push(format!("Prompt error for memory update: {error_id}"));
                    break;
                }
            }
        }
        report
    }

    fn build_prompt(
        &self,
        state: &MemoryState,
        input: &StepInput,
        plan: &CompactionPlan,
    ) -> Result<BuiltPrompt, PromptError> {
        let mut builder = PromptBuilder::new(
            self.model.max_token_count,
            self.config.reserved_response_tokens,
            self.counter.clone(),
        );

        let general = builder.add_section("generalInfo", None)?;
        let personality = builder.add_section("corePersonality", None)?;
        let previous = builder.add_section("previousShortTermMemory", None)?;
        let activity = builder.add_section("activity", None)?;
        let instructions = builder.add_section("instructions", None)?;
        let completion = builder.add_section("completionSetup", None)?;

        builder.add_line(instructions, "")?;
        builder.add_text(
            instructions,
            &COMPACTION_INSTRUCTIONS.replace(
                "{suggested_tokens}",
                &self.config.suggested_summary_tokens.to_string(),
            ),
            LineKind::Required,
        )?;
        builder.add_line(completion, "## PROMPT")?;
        builder.add_line(completion, "My new summarized short-term memory is:")?;

        add_general_info(&mut builder, general, input)?;

        builder.add_line(personality, "## YOUR CORE PERSONALITY")?;
        builder.add_line(personality, &input.self_info.core_personality)?;
        builder.add_line(personality, "")?;

        builder.add_line(previous, "## YOUR PREVIOUS SHORT TERM MEMORY")?;
        builder.add_line(previous, state.short_term_summary())?;
        builder.add_line(previous, "")?;

        builder.add_line(activity, "## ACTIVITIES TO SUMMARIZE INTO MEMORY")?;
        let log = state.automatic();
        for &index in &plan.summarize {
            builder.add_line(activity, &single_line(&log[index].summary))?;
        }

        Ok(builder.build())
    }
}

fn failure_outcome(failure: PromptFailure) -> CompactionOutcome {
    match failure {
        PromptFailure::RateLimited { error_id } => CompactionOutcome::RateLimited { error_id },
        PromptFailure::ConnectionError { error_id } => {
            CompactionOutcome::ConnectionError { error_id }
        }
        PromptFailure::LengthLimit { error_id, .. } => CompactionOutcome::LengthLimit { error_id },
        PromptFailure::ResponseParseError {
            error_id, message, ..
        }
        | PromptFailure::UnknownApiError { error_id, message } => {
            CompactionOutcome::PromptError { error_id, message }
        }
    }
}

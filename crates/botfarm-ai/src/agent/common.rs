//! Step plumbing shared by both agent kinds.

use std::sync::Arc;

use crate::bridge::AgentMailbox;
use crate::llm::PromptOptions;
use crate::memory::{
    AutomaticShortTermMemory, CompactionReport, MemoryCompactor, MemoryState,
    ingest_initial_memories, ingest_observations,
};
use crate::prompt::{LineKind, PromptBuilder, PromptError, SectionId, distance_unit};
use crate::protocol::{PromptUsage, PromptUsageInfo, StepInput, StepOutput};
use crate::text_utils::single_line;

use super::AgentContext;
use super::scheduler::{CadencePolicy, StepPhase, StepScheduler};

const TIPS_TEMPLATE: &str = include_str!("templates/tips.md");

const DEFAULT_PEOPLE_SIZE: f64 = 40.0;
const DEFAULT_WORLD_SIZE: f64 = 3_500.0;

fn world_constant(input: &StepInput, key: &str, default: f64) -> f64 {
    input
        .world_constants
        .get(key)
        .and_then(|value| value.as_f64())
        .unwrap_or(default)
}

fn activity_line(entry: &AutomaticShortTermMemory, now: f64) -> String {
    let seconds_ago = (now - entry.time).round() as i64;
    format!("{} ({seconds_ago} seconds ago)", single_line(&entry.summary))
}

/// Activity as it was split for one prompt.
#[derive(Debug, Default)]
pub(crate) struct ActivitySnapshot {
    pub previous: Vec<String>,
    pub new: Vec<String>,
}

pub(crate) struct AgentCore {
    pub context: AgentContext,
    pub mailbox: Arc<AgentMailbox>,
    pub memory: MemoryState,
    pub compactor: MemoryCompactor,
    pub scheduler: StepScheduler,
    initialized: bool,
}

impl AgentCore {
    pub fn new(context: AgentContext, mailbox: Arc<AgentMailbox>, policy: CadencePolicy) -> Self {
        let config = &context.config;
        let compactor = MemoryCompactor::new(
            config.compaction.clone(),
            context.llm.clone(),
            context.model.clone(),
            context.counter.clone(),
        );
        Self {
            memory: MemoryState::new(config.retention),
            scheduler: StepScheduler::new(policy, config.cadence.clone()),
            compactor,
            mailbox,
            context,
            initialized: false,
        }
    }

    pub fn emit(&self, output: StepOutput) {
        self.mailbox.push_output(output);
    }

    pub fn consume(&mut self, input: &StepInput) {
        self.scheduler.enter(StepPhase::ConsumingObservations);
        if !self.initialized {
            ingest_initial_memories(&mut self.memory, input);
            self.initialized = true;
        }
        ingest_observations(&mut self.memory, input);
    }

    pub async fn compact(&mut self, input: &StepInput) -> CompactionReport {
        self.scheduler.enter(StepPhase::MaybeCompacting);
        let mailbox = self.mailbox.clone();
        let emit = move |output: StepOutput| mailbox.push_output(output);
        self.compactor
            .compact_until_settled(&mut self.memory, input, &emit)
            .await
    }

    /// Surface compaction trouble on a step that ends without prompting.
    pub fn report_compaction(&self, report: CompactionReport) {
        if report.errors.is_empty() && report.usages.is_empty() {
            return;
        }
        self.emit(
            StepOutput::default()
                .with_usages(report.usages)
                .with_errors(&report.errors, report.was_rate_limited),
        );
    }

    pub fn builder(&self) -> PromptBuilder {
        PromptBuilder::new(
            self.context.model.max_token_count,
            self.context.config.completion_max_tokens,
            self.context.counter.clone(),
        )
    }

    pub fn prompt_options(&self, input: &StepInput, prompt_id: &str) -> PromptOptions {
        PromptOptions::new(
            format!(
                "{} (step) sim={}, agent={}, step={}, prompt={prompt_id}",
                input.agent_type, input.simulation_id, input.agent_id, input.step_id
            ),
            self.context.config.completion_max_tokens as u32,
        )
        .with_temperature(self.context.config.temperature)
    }

    pub fn usage_info(&self, usage: PromptUsage) -> PromptUsageInfo {
        self.context.model.usage_info(usage)
    }

    pub fn add_tips(
        &self,
        builder: &mut PromptBuilder,
        section: SectionId,
        input: &StepInput,
        say_hint: &str,
    ) -> Result<(), PromptError> {
        let unit = distance_unit(input);
        let tips = TIPS_TEMPLATE
            .replace("{say_hint}", say_hint)
            .replace(
                "{people_size}",
                &world_constant(input, "peopleSize", DEFAULT_PEOPLE_SIZE).to_string(),
            )
            .replace("{distance_unit}", unit);
        builder.add_text(section, &tips, LineKind::Required)?;

        let since = self
            .scheduler
            .seconds_since_previous_prompt(input.simulation_time);
        builder.add_value(section, "Seconds since your previous prompt", since.round() as i64)?;
        builder.add_line(
            section,
            &format!(
                "The available locations to move to are between [0,0] and [{},{}]",
                world_constant(input, "worldWidth", DEFAULT_WORLD_SIZE).round() as i64,
                world_constant(input, "worldHeight", DEFAULT_WORLD_SIZE).round() as i64,
            ),
        )?;
        builder.add_line(section, "")?;
        Ok(())
    }

    pub fn add_personality(
        &self,
        builder: &mut PromptBuilder,
        section: SectionId,
        input: &StepInput,
    ) -> Result<(), PromptError> {
        builder.add_line(section, "## YOUR CORE PERSONALITY")?;
        builder.add_line(section, &input.self_info.core_personality)?;
        builder.add_line(section, "")?;
        Ok(())
    }

    pub fn add_short_term_memory(
        &self,
        builder: &mut PromptBuilder,
        section: SectionId,
    ) -> Result<(), PromptError> {
        builder.add_line(section, "## YOUR_ACTIVE_MEMORY")?;
        builder.add_line(section, self.memory.short_term_summary())?;
        builder.add_line(section, "")?;
        Ok(())
    }

    /// Fill the two activity sections, new activity first so older
    /// activity is what gets cut when the budget runs out.
    pub fn fill_activity(
        &self,
        builder: &mut PromptBuilder,
        recent_section: SectionId,
        new_section: SectionId,
        input: &StepInput,
    ) -> Result<ActivitySnapshot, PromptError> {
        let now = input.simulation_time;
        let (previous, new) = self
            .memory
            .split_activity(self.scheduler.activity_split_time());
        let snapshot = ActivitySnapshot {
            previous: previous.iter().map(|e| activity_line(e, now)).collect(),
            new: new.iter().map(|e| activity_line(e, now)).collect(),
        };

        let header = builder.add_optional_line(
            new_section,
            "## NEW_OBSERVED_ACTIVITY (YOU SHOULD CONSIDER REACTING TO THIS)",
        )?;
        if header.did_fit {
            if snapshot.new.is_empty() {
                builder.add_optional_line(new_section, "<none>")?;
            }
            for line in &snapshot.new {
                if !builder.add_optional_line(new_section, line)?.did_fit {
                    break;
                }
            }
            builder.add_optional_line(new_section, "")?;
        }

        if !snapshot.previous.is_empty() {
            let header = builder.add_optional_line(
                recent_section,
                "## PREVIOUS_OBSERVED_ACTIVITY (YOU MAY HAVE ALREADY REACTED TO THESE)",
            )?;
            if header.did_fit {
                for line in &snapshot.previous {
                    builder.add_optional_line(recent_section, line)?;
                }
                builder.add_optional_line(recent_section, "")?;
            }
        }

        Ok(snapshot)
    }

    pub fn debug_info(&self, activity: &ActivitySnapshot) -> String {
        let mut lines = vec![
            "### Short-Term Memory".to_string(),
            self.memory.short_term_summary().to_string(),
            String::new(),
            "### Previous Activity".to_string(),
        ];
        lines.extend(activity.previous.iter().cloned());
        lines.push(String::new());
        lines.push("### New Activity".to_string());
        lines.extend(activity.new.iter().cloned());
        lines.join("\n")
    }

    /// Store thoughts the model chose to keep.
    pub fn record_thoughts<'a>(
        &mut self,
        thoughts: impl IntoIterator<Item = &'a str>,
        input: &StepInput,
    ) {
        for thought in thoughts {
            self.memory.record_thought(
                thought,
                input.simulation_time,
                input.self_info.location(),
                0,
            );
        }
    }
}

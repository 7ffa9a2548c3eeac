use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::bridge::AgentMailbox;
use crate::error::Result;
use crate::llm::{PromptFailure, run_json_prompt};
use crate::memory::MemoryState;
use crate::prompt::{BuiltPrompt, LineKind, PromptError, add_general_info};
use crate::protocol::{
    AgentStatus, PromptUsage, StepInput, StepOutput, short_id, unix_time_seconds,
};

use super::common::{ActivitySnapshot, AgentCore};
use super::entities::{entity_state_json, sorted_observed_entities};
use super::response::{AgentResponse, response_actions};
use super::scheduler::{CadencePolicy, StepPhase};
use super::{Agent, AgentContext};

const OUTPUT_SCHEMA: &str = include_str!("templates/output_schema.md");
const INSTRUCTIONS: &str = include_str!("templates/instructions.md");

const OBSERVED_ENTITIES_RESERVE: usize = 1_000;

/// Agent that answers each prompt with one JSON object of actions.
pub struct DefaultAgent {
    core: AgentCore,
}

impl DefaultAgent {
    pub fn new(context: AgentContext, mailbox: Arc<AgentMailbox>) -> Self {
        Self {
            core: AgentCore::new(context, mailbox, CadencePolicy::Uniform),
        }
    }

    pub fn memory(&self) -> &MemoryState {
        &self.core.memory
    }

    pub fn phase(&self) -> StepPhase {
        self.core.scheduler.phase()
    }

    /// Fold `input` into memory and build the prompt a step would send,
    /// without calling the model.
    pub fn preview_prompt(&mut self, input: &StepInput) -> Result<BuiltPrompt> {
        self.core.consume(input);
        let (prompt, _) = self.build_prompt(input)?;
        Ok(prompt)
    }

    fn build_prompt(
        &self,
        input: &StepInput,
    ) -> std::result::Result<(BuiltPrompt, ActivitySnapshot), PromptError> {
        let core = &self.core;
        let self_info = &input.self_info;
        let mut builder = core.builder();

        let general = builder.add_section("generalInfo", None)?;
        add_general_info(&mut builder, general, input)?;

        let tips = builder.add_section("tips", None)?;
        core.add_tips(&mut builder, tips, input, " using the iWantToSay key")?;

        let schema = builder.add_section("outputSchema", None)?;
        builder.add_text(schema, OUTPUT_SCHEMA, LineKind::Required)?;
        builder.add_line(schema, "")?;

        let personality = builder.add_section("corePersonality", None)?;
        core.add_personality(&mut builder, personality, input)?;

        let recipes = builder.add_section("craftingRecipes", None)?;
        builder.add_line(recipes, "## ITEM_CRAFTING_RECIPES")?;
        for recipe in &input.crafting_recipes {
            let cost: Vec<Value> = recipe
                .cost
                .entries
                .iter()
                .map(|entry| {
                    json!({
                        "costItemAmount": entry.amount,
                        "costItemConfigKey": entry.item_config_key,
                    })
                })
                .collect();
            let line = json!({
                "itemConfigKey": recipe.item_config_key,
                "itemName": recipe.item_name,
                "craftingCost": cost,
            });
            builder.add_json_line(recipes, &line, false, LineKind::Required)?;
        }
        builder.add_line(recipes, "")?;

        let inventory = builder.add_section("yourInventory", None)?;
        builder.add_line(inventory, "## YOUR_ITEM_INVENTORY")?;
        for stack in &self_info.inventory_info.item_stacks {
            let mut action_ids = Vec::new();
            if stack.can_be_equipped {
                action_ids.push("equipItem");
            }
            if stack.can_be_dropped {
                action_ids.push("dropItem");
            }
            let line = json!({
                "itemConfigKey": stack.item_config_key,
                "youHaveQuantity": stack.amount,
                "availableActionIds": action_ids,
                "itemInfo": {
                    "itemName": stack.item_name,
                    "itemDescription": stack.item_description,
                },
            });
            builder.add_json_line(inventory, &line, false, LineKind::Required)?;
        }
        builder.add_line(inventory, "")?;

        let own_state = builder.add_section("yourOwnState", None)?;
        builder.add_line(own_state, "## YOUR_OWN_STATE")?;
        builder.add_json_line(
            own_state,
            &entity_state_json(&self_info.entity_info),
            false,
            LineKind::Required,
        )?;
        builder.add_line(own_state, "")?;

        let observed = builder.add_section("observedEntities", Some(OBSERVED_ENTITIES_RESERVE))?;
        builder.add_line(observed, "## OBSERVED_ENTITIES")?;
        let entities = sorted_observed_entities(input);
        for (index, entity) in entities.iter().enumerate() {
            let fit = builder.add_json_line(
                observed,
                &entity_state_json(entity),
                false,
                LineKind::Optional,
            )?;
            if !fit.did_fit {
                tracing::debug!(
                    agent_id = %input.agent_id,
                    listed = index,
                    total = entities.len(),
                    "Observed entity did not fit"
                );
                break;
            }
        }
        builder.add_optional_line(observed, "")?;

        let memory = builder.add_section("shortTermMemory", None)?;
        core.add_short_term_memory(&mut builder, memory)?;

        let recent = builder.add_section("recentActivity", None)?;
        let new = builder.add_section("newActivity", None)?;
        let instructions = builder.add_section("instructions", None)?;
        builder.add_text(instructions, INSTRUCTIONS, LineKind::Required)?;

        let activity = core.fill_activity(&mut builder, recent, new, input)?;

        tracing::trace!(usage = %builder.usage_summary(), "Step prompt budget");
        Ok((builder.build(), activity))
    }
}

fn decode_response(
    usage: PromptUsage,
    json: serde_json::Map<String, Value>,
) -> std::result::Result<AgentResponse, PromptFailure> {
    serde_json::from_value(Value::Object(json)).map_err(|error| {
        let error_id = short_id();
        tracing::warn!(
            error_id = %error_id,
            error = %error,
            "Prompt response does not match the output schema"
        );
        PromptFailure::ResponseParseError {
            error_id,
            usage,
            message: error.to_string(),
        }
    })
}

#[async_trait]
impl Agent for DefaultAgent {
    async fn consume_input(&mut self, input: &StepInput) -> Result<()> {
        self.core.consume(input);
        Ok(())
    }

    async fn step(&mut self, input: &StepInput) -> Result<()> {
        let report = self.core.compact(input).await;

        self.core.scheduler.enter(StepPhase::DecidingToPrompt);
        if !self
            .core
            .scheduler
            .should_prompt(unix_time_seconds(), false, false)
        {
            self.core.report_compaction(report);
            return Ok(());
        }

        self.core.scheduler.enter(StepPhase::RunningPrompt);
        let start_time = unix_time_seconds();
        self.core
            .emit(StepOutput::status(AgentStatus::RunningPrompt, start_time));

        let (prompt, activity) = match self.build_prompt(input) {
            Ok(built) => built,
            Err(error) => {
                // Compaction already ran and was billed this step.
                self.core.report_compaction(report);
                return Err(error.into());
            }
        };
        let prompt_id = short_id();
        let options = self.core.prompt_options(input, &prompt_id);
        let sent_at = input.simulation_time;

        let mut usages = report.usages;
        let mut errors = report.errors;
        let was_rate_limited = report.was_rate_limited;

        let result = run_json_prompt(self.core.context.llm.as_ref(), &prompt, &options)
            .await
            .and_then(|(success, extracted)| {
                decode_response(success.usage, extracted.json).map(|response| (success, response))
            });

        self.core.scheduler.enter(StepPhase::ApplyingResponse);
        let (success, response) = match result {
            Ok(parsed) => parsed,
            Err(failure) => {
                if let Some(usage) = failure.usage() {
                    usages.push(self.core.usage_info(usage));
                }
                let back_off = failure.should_back_off();
                if back_off {
                    self.core.scheduler.prompt_deferred(unix_time_seconds());
                }
                errors.push(failure.to_string());
                self.core.emit(
                    StepOutput::default()
                        .with_usages(usages)
                        .with_errors(&errors, was_rate_limited || back_off),
                );
                return Ok(());
            }
        };
        usages.push(self.core.usage_info(success.usage));
        self.core
            .scheduler
            .prompt_completed(sent_at, unix_time_seconds());

        let (actions, action_errors) = response_actions(&response);
        errors.extend(action_errors);
        let debug_info = self.core.debug_info(&activity);
        self.core.record_thoughts(response.thoughts(), input);

        tracing::info!(
            agent_id = %input.agent_id,
            prompt_id = %prompt_id,
            actions = actions.len(),
            "Step prompt finished"
        );

        let done_time = unix_time_seconds();
        self.core.emit(
            StepOutput::status(AgentStatus::PromptFinished, start_time)
                .with_duration(done_time - start_time)
                .with_actions(actions)
                .with_debug_info(debug_info)
                .with_usages(usages)
                .with_errors(&errors, was_rate_limited),
        );
        Ok(())
    }
}

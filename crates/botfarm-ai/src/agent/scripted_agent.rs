use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::bridge::{ActionBridge, AgentMailbox, CancelToken};
use crate::error::Result;
use crate::llm::{extract_script, run_prompt};
use crate::memory::MemoryState;
use crate::prompt::{BuiltPrompt, LineKind, PromptBuilder, PromptError, SectionId, add_general_info};
use crate::protocol::{AgentStatus, EntityInfo, StepInput, StepOutput, short_id, unix_time_seconds};
use crate::script::{ScriptApi, ScriptOutcome, SharedWorldView, WorldView, run_script, to_literal};

use super::common::{ActivitySnapshot, AgentCore};
use super::entities::{entity_variable_name, grouped_observed_entities, identifier};
use super::scheduler::{CadencePolicy, StepPhase};
use super::{Agent, AgentContext};

const INTRO: &str = include_str!("templates/scripted_intro.md");
const SCRIPT_API: &str = include_str!("templates/script_api.md");

const UNIQUE_ENTITY_SHARE: f64 = 0.333;
const NON_UNIQUE_ENTITY_RESERVE: usize = 300;
const OMITTED_INTRO_RESERVE: usize = 50;
const INVENTORY_RESERVE: usize = 700;

/// `let name = literal;`, or `None` if `value` has no JSON form.
fn binding(name: &str, value: &impl Serialize) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .map(|value| format!("let {name} = {};", to_literal(&value)))
}

/// Add `lines` as optional lines until one does not fit. Returns the lines
/// that made it in.
fn add_bindings(
    builder: &mut PromptBuilder,
    section: SectionId,
    lines: impl IntoIterator<Item = String>,
) -> std::result::Result<Vec<String>, PromptError> {
    let mut added = Vec::new();
    for line in lines {
        if !builder.add_optional_line(section, &line)?.did_fit {
            break;
        }
        added.push(line);
    }
    Ok(added)
}

fn omitted_summary(omitted: &[&EntityInfo]) -> Vec<String> {
    let mut characters = 0;
    let mut others = 0;
    let mut items: BTreeMap<&str, usize> = BTreeMap::new();
    for entity in omitted {
        match (&entity.character_info, &entity.item_info) {
            (Some(_), _) => characters += 1,
            (None, Some(item)) => *items.entry(item.item_config_key.as_str()).or_default() += 1,
            (None, None) => others += 1,
        }
    }

    let mut lines = Vec::new();
    if characters > 0 {
        lines.push(format!("//     {characters} were other character entities"));
    }
    for (key, count) in items {
        lines.push(format!("//     {count} were '{key}' item entities"));
    }
    if others > 0 {
        lines.push(format!("//     {others} were other entities"));
    }
    lines
}

/// A step prompt plus the world bindings it showed the model.
struct ScriptPrompt {
    prompt: BuiltPrompt,
    bindings: Vec<String>,
    activity: ActivitySnapshot,
}

struct RunningScript {
    prompt_id: String,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Agent that answers each prompt with a program and runs it against the
/// world, one action at a time, until the next prompt replaces it.
pub struct ScriptedAgent {
    core: AgentCore,
    world: SharedWorldView,
    running: Option<RunningScript>,
}

impl ScriptedAgent {
    pub fn new(context: AgentContext, mailbox: Arc<AgentMailbox>) -> Self {
        Self {
            core: AgentCore::new(context, mailbox, CadencePolicy::Adaptive),
            world: Arc::new(RwLock::new(WorldView::default())),
            running: None,
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
        self.world.write().update(input);
        Ok(self.build_prompt(input)?.prompt)
    }

    pub fn is_script_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    fn build_prompt(&self, input: &StepInput) -> std::result::Result<ScriptPrompt, PromptError> {
        let core = &self.core;
        let self_info = &input.self_info;
        let mut builder = core.builder();

        let general = builder.add_section("generalInfo", None)?;
        add_general_info(&mut builder, general, input)?;
        builder.add_text(general, INTRO, LineKind::Required)?;
        builder.add_line(general, "")?;

        let tips = builder.add_section("tips", None)?;
        core.add_tips(&mut builder, tips, input, " by calling speak")?;

        let personality = builder.add_section("corePersonality", None)?;
        core.add_personality(&mut builder, personality, input)?;

        let memory = builder.add_section("shortTermMemory", None)?;
        core.add_short_term_memory(&mut builder, memory)?;

        let recent = builder.add_section("recentActivity", None)?;
        let new = builder.add_section("newActivity", None)?;

        let code_start = builder.add_section("codeBlockStart", None)?;
        builder.add_line(code_start, "```rhai")?;

        let interfaces = builder.add_section("interfaces", None)?;
        builder.add_text(interfaces, SCRIPT_API, LineKind::Required)?;
        builder.add_line(interfaces, "")?;

        let recipes = builder.add_section("craftingRecipes", None)?;
        builder.add_line(recipes, "// Crafting recipes:")?;

        let unique_reserve =
            (core.context.model.max_token_count as f64 * UNIQUE_ENTITY_SHARE).round() as usize;
        let unique_list = builder.add_section("uniqueEntityList", Some(unique_reserve))?;
        let non_unique_list =
            builder.add_section("nonUniqueEntityList", Some(NON_UNIQUE_ENTITY_RESERVE))?;
        let omitted_intro =
            builder.add_section("omittedEntityIntro", Some(OMITTED_INTRO_RESERVE))?;
        let omitted_lines = builder.add_section("omittedEntitySummary", None)?;
        let inventory = builder.add_section("inventoryList", Some(INVENTORY_RESERVE))?;

        let own_state = builder.add_section("selfSection", None)?;
        builder.add_line(own_state, "")?;
        let self_binding = binding("self_entity", &self_info.entity_info);
        if let Some(line) = &self_binding {
            builder.add_line(own_state, line)?;
        }

        let code_end = builder.add_section("codeBlockEnd", None)?;
        builder.add_line(code_end, "")?;
        builder.add_line(code_end, "```")?;

        // Entities share one index so every variable name is distinct.
        let grouped = grouped_observed_entities(input);
        let mut entity_bindings = Vec::new();
        let mut omitted: Vec<&EntityInfo> = Vec::new();
        if !grouped.is_empty() {
            builder.add_optional_line(unique_list, "// Nearby entities in the world:")?;
        }
        for (list, section) in [
            (&grouped.unique, unique_list),
            (&grouped.non_unique, non_unique_list),
        ] {
            let mut fitted = 0;
            for entity in list.iter() {
                let name = entity_variable_name(entity, entity_bindings.len());
                let Some(line) = binding(&name, entity) else {
                    continue;
                };
                if !builder.add_optional_line(section, &line)?.did_fit {
                    break;
                }
                entity_bindings.push(line);
                fitted += 1;
            }
            omitted.extend(list.iter().skip(fitted).copied());
        }

        let stacks = &self_info.inventory_info.item_stacks;
        let inventory_bindings = if stacks.is_empty() {
            builder.add_optional_line(inventory, "// You have no inventory items")?;
            Vec::new()
        } else {
            builder.add_optional_line(inventory, "// Your inventory item stacks")?;
            let lines = stacks.iter().enumerate().filter_map(|(index, stack)| {
                let mut value = serde_json::to_value(stack).ok()?;
                if let Some(map) = value.as_object_mut() {
                    map.insert("stackIndex".into(), index.into());
                }
                Some(format!(
                    "let inventory_item_{index} = {};",
                    to_literal(&value)
                ))
            });
            add_bindings(&mut builder, inventory, lines)?
        };

        if !omitted.is_empty() {
            tracing::debug!(
                agent_id = %input.agent_id,
                omitted = omitted.len(),
                total = grouped.len(),
                "Entities omitted from script prompt"
            );
            let count = omitted.len();
            builder.add_optional_line(
                omitted_intro,
                &format!(
                    "// NOTE: {count} entities were omitted from the above list to reduce prompt size."
                ),
            )?;
            builder.add_optional_line(
                omitted_intro,
                "// You can use nearby_entities() in your script to get the full list",
            )?;
            builder.add_optional_line(omitted_intro, "//   Summary of omitted entities:")?;
        }

        let activity = core.fill_activity(&mut builder, recent, new, input)?;

        let recipe_lines = input.crafting_recipes.iter().filter_map(|recipe| {
            binding(
                &format!("crafting_recipe_{}", identifier(&recipe.item_config_key)),
                recipe,
            )
        });
        let mut bindings = add_bindings(&mut builder, recipes, recipe_lines)?;
        builder.add_line(recipes, "")?;

        add_bindings(&mut builder, omitted_lines, omitted_summary(&omitted))?;
        builder.add_line(omitted_lines, "")?;

        bindings.extend(entity_bindings);
        bindings.extend(inventory_bindings);
        bindings.extend(self_binding);

        tracing::trace!(usage = %builder.usage_summary(), "Script prompt budget");
        Ok(ScriptPrompt {
            prompt: builder.build(),
            bindings,
            activity,
        })
    }

    /// Cancel the current program and give it a grace period to unwind.
    async fn stop_script(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        self.core.mailbox.wake();

        let grace = Duration::from_millis(self.core.context.config.script_shutdown_grace_ms);
        match tokio::time::timeout(grace, &mut running.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::error!(prompt_id = %running.prompt_id, error = %error, "Script task failed");
            }
            Err(_) => {
                tracing::warn!(
                    prompt_id = %running.prompt_id,
                    grace_ms = grace.as_millis() as u64,
                    "Script did not unwind in time; abandoning it"
                );
            }
        }
    }

    fn start_script(&mut self, prompt_id: String, source: String) {
        let cancel = CancelToken::new();
        let mailbox = self.core.mailbox.clone();
        let bridge = ActionBridge::new(
            mailbox.clone(),
            cancel.clone(),
            self.core.context.config.bridge.clone(),
        );
        let api = ScriptApi::new(bridge, self.world.clone());

        let start_time = unix_time_seconds();
        mailbox.push_output(StepOutput::status(AgentStatus::RunningScript, start_time));

        let id = prompt_id.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = run_script(&api, &source);
            let duration = unix_time_seconds() - start_time;
            match outcome {
                ScriptOutcome::Completed => {
                    tracing::debug!(prompt_id = %id, "Script finished");
                    mailbox.push_output(
                        StepOutput::status(AgentStatus::ScriptDone, start_time)
                            .with_duration(duration),
                    );
                }
                ScriptOutcome::Unwound => {}
                ScriptOutcome::Failed(message) => {
                    tracing::warn!(prompt_id = %id, error = %message, "Script raised an exception");
                    let error = format!("Exception evaluating script ({id}): {message}");
                    mailbox.push_output(
                        StepOutput::status(AgentStatus::ScriptException, start_time)
                            .with_duration(duration)
                            .with_errors(&[error], false),
                    );
                }
            }
        });

        self.running = Some(RunningScript {
            prompt_id,
            cancel,
            handle,
        });
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn consume_input(&mut self, input: &StepInput) -> Result<()> {
        self.core.consume(input);
        self.core.mailbox.receive(&input.new_observations);
        self.world.write().update(input);

        let thoughts = self.core.mailbox.take_thoughts();
        self.core
            .record_thoughts(thoughts.iter().map(String::as_str), input);
        Ok(())
    }

    async fn step(&mut self, input: &StepInput) -> Result<()> {
        let report = self.core.compact(input).await;

        self.core.scheduler.enter(StepPhase::DecidingToPrompt);
        let high_priority = self
            .core
            .memory
            .has_high_priority_since(self.core.scheduler.activity_split_time());
        let running = self.is_script_running();
        if !self
            .core
            .scheduler
            .should_prompt(unix_time_seconds(), high_priority, running)
        {
            self.core.report_compaction(report);
            return Ok(());
        }

        self.core.scheduler.enter(StepPhase::RunningPrompt);
        let start_time = unix_time_seconds();
        self.core
            .emit(StepOutput::status(AgentStatus::RunningPrompt, start_time));

        let ScriptPrompt {
            prompt,
            bindings,
            activity,
        } = match self.build_prompt(input) {
            Ok(built) => built,
            Err(error) => {
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

        let result = run_prompt(self.core.context.llm.as_ref(), &prompt, &options).await;

        self.core.scheduler.enter(StepPhase::ApplyingResponse);
        let success = match result {
            Ok(success) => success,
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

        let script = match extract_script(&success.response_text) {
            Ok(script) => script,
            Err(error) => {
                let error_id = short_id();
                tracing::warn!(error_id = %error_id, error = %error, "Could not extract script");
                errors.push(format!(
                    "Failed to extract script from prompt output (errorId = {error_id})"
                ));
                self.core.emit(
                    StepOutput::default()
                        .with_usages(usages)
                        .with_errors(&errors, was_rate_limited),
                );
                return Ok(());
            }
        };

        let done_time = unix_time_seconds();
        self.core.emit(
            StepOutput::status(AgentStatus::PromptFinished, start_time)
                .with_duration(done_time - start_time)
                .with_script(script.clone())
                .with_debug_info(self.core.debug_info(&activity))
                .with_usages(usages)
                .with_errors(&errors, was_rate_limited),
        );

        self.stop_script().await;

        tracing::info!(
            agent_id = %input.agent_id,
            prompt_id = %prompt_id,
            bindings = bindings.len(),
            "Starting script"
        );
        let mut source = bindings.join("\n");
        source.push('\n');
        source.push_str(&script);
        self.start_script(prompt_id, source);
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.stop_script().await;
        self.core.mailbox.close();
    }
}

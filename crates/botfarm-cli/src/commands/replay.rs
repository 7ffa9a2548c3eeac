use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use botfarm_ai::protocol::{ActionOutcome, ActionResult, AgentStatus, Observations};
use botfarm_ai::{
    AgentContainer, AgentContext, LlmClient, MockLlmClient, MockStep, ModelInfo, OpenAIClient,
    StepInput, StepOutput, counter_for_model,
};
use serde_json::json;

use crate::cli::{OutputFormat, ReplayArgs};
use crate::commands::{load_inputs, override_agent_type};
use crate::config::BotfarmConfig;
use crate::output::{describe_output, print_json_line};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn build_client(config: &BotfarmConfig, args: &ReplayArgs) -> Result<Arc<dyn LlmClient>> {
    if !args.mock_responses.is_empty() {
        let steps = args
            .mock_responses
            .iter()
            .map(|path| {
                std::fs::read_to_string(path)
                    .map(MockStep::text)
                    .with_context(|| format!("Failed to read mock response {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(responses = steps.len(), "Replaying with mock model responses");
        return Ok(Arc::new(MockLlmClient::from_steps(&config.model.id, steps)));
    }

    let Some(api_key) = args.api_key.clone().or_else(|| config.api_key()) else {
        bail!("No API key: set BOTFARM_OPENAI_API_KEY or pass --mock-response");
    };
    let mut client = OpenAIClient::new(api_key)?.with_model(&config.model.id);
    if let Some(base_url) = &config.model.base_url {
        client = client.with_base_url(base_url);
    }
    Ok(Arc::new(client))
}

/// The simulation's answer to `output`: every action started and
/// succeeded.
fn acknowledgement(input: &StepInput, output: &StepOutput) -> StepInput {
    let mut ack = input.clone();
    ack.new_observations = Observations {
        started_action_unique_ids: output
            .actions
            .iter()
            .map(|action| action.action_unique_id.clone())
            .collect(),
        action_results: output
            .actions
            .iter()
            .map(|action| ActionResult {
                action_unique_id: action.action_unique_id.clone(),
                outcome: ActionOutcome::Success,
            })
            .collect(),
        ..Observations::default()
    };
    ack
}

/// Print outputs for `input`'s agent until a prompt in flight has ended
/// and nothing new has arrived for `settle`.
async fn drain_until_settled(
    container: &AgentContainer,
    input: &StepInput,
    args: &ReplayArgs,
    format: OutputFormat,
) -> Result<usize> {
    let settle = Duration::from_millis(args.settle_ms);
    let agent_key = input.agent_key();
    let mut printed = 0;
    let mut prompt_in_flight = false;
    let mut quiet_since = Instant::now();

    loop {
        let outputs = container.consume_pending_outputs(
            &input.simulation_id,
            &input.agent_id,
            &input.agent_type,
        );
        if outputs.is_empty() {
            if !prompt_in_flight && quiet_since.elapsed() >= settle {
                return Ok(printed);
            }
        } else {
            quiet_since = Instant::now();
        }

        for output in outputs {
            match output.agent_status {
                Some(AgentStatus::RunningPrompt) => prompt_in_flight = true,
                Some(AgentStatus::PromptFinished) => prompt_in_flight = false,
                _ if output.error.is_some() => prompt_in_flight = false,
                _ => {}
            }

            if format.is_json() {
                print_json_line(&json!({"agentKey": agent_key, "output": output}))?;
            } else {
                println!("{}", describe_output(&agent_key, &output));
            }
            printed += 1;

            if args.ack_actions && !output.actions.is_empty() {
                container.add_pending_input(acknowledgement(input, &output))?;
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn run(config: &BotfarmConfig, args: ReplayArgs, format: OutputFormat) -> Result<()> {
    let mut inputs = load_inputs(&args.inputs)?;
    override_agent_type(&mut inputs, args.agent_type.as_deref());

    let model = ModelInfo::lookup(&config.model.id);
    let context = AgentContext::new(
        build_client(config, &args)?,
        model.clone(),
        counter_for_model(&model.model_id),
    )
    .with_config(config.agent_config());
    let container = AgentContainer::new(context, config.runner_config());

    let mut simulations = BTreeSet::new();
    let mut printed = 0;
    for input in &inputs {
        simulations.insert(input.simulation_id.clone());
        container.add_pending_input(input.clone())?;
        printed += drain_until_settled(&container, input, &args, format).await?;
    }

    for simulation_id in &simulations {
        container.terminate_simulation(simulation_id).await;
    }
    tracing::info!(inputs = inputs.len(), outputs = printed, "Replay finished");
    Ok(())
}

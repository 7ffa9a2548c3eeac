//! Agent runner - one worker task per agent, keyed by simulation, agent
//! and agent type.
//!
//! Inputs are queued to the worker as they arrive. Each worker iteration
//! folds every queued input into agent state, then steps once against the
//! latest one. Outputs accumulate in the agent's mailbox until the host
//! collects them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{Agent, AgentContext, AgentKind, create_agent};
use crate::bridge::AgentMailbox;
use crate::error::{AiError, Result};
use crate::protocol::{StepInput, StepOutput, short_id};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Pause after each step so inputs arriving close together are
    /// handled as one batch.
    pub step_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { step_delay_ms: 250 }
    }
}

impl RunnerConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

pub fn agent_key(simulation_id: &str, agent_id: &str, agent_type: &str) -> String {
    format!("{simulation_id}:{agent_id}:{agent_type}")
}

struct AgentWorker {
    simulation_id: String,
    sender: mpsc::UnboundedSender<StepInput>,
    mailbox: Arc<AgentMailbox>,
    handle: JoinHandle<()>,
}

/// Queue an error for the host and log the details under an id it can
/// quote back.
fn report_error(mailbox: &AgentMailbox, agent_key: &str, error: &AiError) {
    let error_id = short_id();
    tracing::error!(
        error_id = %error_id,
        agent_key = %agent_key,
        error = %error,
        "Agent step failed"
    );
    mailbox.push_output(StepOutput::error(format!(
        "Error on agent server (errorId = {error_id})"
    )));
}

async fn run_worker(
    agent_key: String,
    mut agent: Box<dyn Agent>,
    mailbox: Arc<AgentMailbox>,
    mut inputs: mpsc::UnboundedReceiver<StepInput>,
    config: RunnerConfig,
) {
    tracing::info!(agent_key = %agent_key, "Agent worker started");
    while let Some(first) = inputs.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = inputs.try_recv() {
            batch.push(next);
        }

        for input in &batch {
            if let Err(error) = agent.consume_input(input).await {
                report_error(&mailbox, &agent_key, &error);
            }
        }

        if let Some(latest) = batch.last() {
            tracing::debug!(
                agent_key = %agent_key,
                step_id = %latest.step_id,
                batched = batch.len(),
                "Stepping agent"
            );
            if let Err(error) = agent.step(latest).await {
                report_error(&mailbox, &agent_key, &error);
            }
        }

        tokio::time::sleep(config.step_delay()).await;
    }

    agent.shutdown().await;
    tracing::info!(agent_key = %agent_key, "Agent worker stopped");
}

/// Every live agent of every simulation this process serves.
pub struct AgentContainer {
    context: AgentContext,
    config: RunnerConfig,
    workers: DashMap<String, AgentWorker>,
}

impl AgentContainer {
    pub fn new(context: AgentContext, config: RunnerConfig) -> Self {
        Self {
            context,
            config,
            workers: DashMap::new(),
        }
    }

    /// Queue `input` for its agent, starting a worker on first contact.
    /// Must be called from within a tokio runtime.
    pub fn add_pending_input(&self, input: StepInput) -> Result<()> {
        let kind: AgentKind = input.agent_type.parse()?;
        let key = input.agent_key();

        let worker = self.workers.entry(key.clone()).or_insert_with(|| {
            tracing::info!(agent_key = %key, kind = %kind, "Creating agent");
            let mailbox = Arc::new(AgentMailbox::new());
            let agent = create_agent(kind, self.context.clone(), mailbox.clone());
            let (sender, receiver) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_worker(
                key.clone(),
                agent,
                mailbox.clone(),
                receiver,
                self.config.clone(),
            ));
            AgentWorker {
                simulation_id: input.simulation_id.clone(),
                sender,
                mailbox,
                handle,
            }
        });

        worker
            .sender
            .send(input)
            .map_err(|_| AiError::Agent(format!("Agent worker {key} has stopped")))
    }

    /// Take everything the agent has produced since the last call. Unknown
    /// agents have produced nothing.
    pub fn consume_pending_outputs(
        &self,
        simulation_id: &str,
        agent_id: &str,
        agent_type: &str,
    ) -> Vec<StepOutput> {
        self.workers
            .get(&agent_key(simulation_id, agent_id, agent_type))
            .map(|worker| worker.mailbox.drain_outputs())
            .unwrap_or_default()
    }

    pub fn agent_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop every agent of one simulation and wait for their workers.
    /// Returns how many agents were stopped.
    pub async fn terminate_simulation(&self, simulation_id: &str) -> usize {
        let keys: Vec<String> = self
            .workers
            .iter()
            .filter(|entry| entry.value().simulation_id == simulation_id)
            .map(|entry| entry.key().clone())
            .collect();

        let handles: Vec<JoinHandle<()>> = keys
            .iter()
            .filter_map(|key| self.workers.remove(key))
            .map(|(_, worker)| {
                // Dropping the sender ends the worker loop.
                drop(worker.sender);
                worker.handle
            })
            .collect();

        let stopped = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(error) = result {
                tracing::error!(simulation_id = %simulation_id, error = %error, "Agent worker panicked");
            }
        }
        tracing::info!(simulation_id = %simulation_id, stopped, "Terminated simulation");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentConfig, PromptCadence};
    use crate::llm::{MockLlmClient, MockStep, ModelInfo};
    use crate::protocol::{AgentStatus, EntityId, EntityInfo, SelfInfo, Vector2};
    use crate::token::HeuristicCounter;

    fn step_input(agent_type: &str, simulation_id: &str, time: f64) -> StepInput {
        StepInput {
            agent_type: agent_type.to_string(),
            step_id: format!("step-{time}"),
            agent_id: "agent-1".to_string(),
            simulation_id: simulation_id.to_string(),
            simulation_time: time,
            self_info: SelfInfo {
                entity_info: EntityInfo {
                    observed_at_simulation_time: time,
                    entity_id: EntityId::from("me"),
                    location: Vector2::new(0.0, 0.0),
                    item_info: None,
                    damageable_info: None,
                    character_info: None,
                    available_action_ids: None,
                },
                core_personality: "Calm.".to_string(),
                initial_memories: Vec::new(),
                observation_distance: 100.0,
                inventory_info: Default::default(),
                equipped_item_config_key: None,
            },
            new_observations: Default::default(),
            world_constants: serde_json::json!({}),
            crafting_recipes: Vec::new(),
        }
    }

    fn container(client: &MockLlmClient) -> AgentContainer {
        let context = AgentContext::new(
            Arc::new(client.clone()),
            ModelInfo::lookup("gpt-4"),
            Arc::new(HeuristicCounter),
        )
        .with_config(AgentConfig {
            cadence: PromptCadence::immediate(),
            ..AgentConfig::default()
        });
        AgentContainer::new(context, RunnerConfig { step_delay_ms: 0 })
    }

    async fn wait_for_outputs(container: &AgentContainer, simulation_id: &str) -> Vec<StepOutput> {
        let mut outputs = Vec::new();
        for _ in 0..200 {
            outputs.extend(container.consume_pending_outputs(simulation_id, "agent-1", "default"));
            if outputs
                .iter()
                .any(|o| o.agent_status == Some(AgentStatus::PromptFinished) || o.error.is_some())
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        outputs
    }

    #[tokio::test]
    async fn test_unknown_agent_type_is_rejected() {
        let container = container(&MockLlmClient::new("gpt-4"));
        let error = container
            .add_pending_input(step_input("puppet", "sim-1", 1.0))
            .unwrap_err();
        assert!(error.to_string().contains("Unknown agent type: puppet"));
        assert_eq!(container.agent_count(), 0);
    }

    #[tokio::test]
    async fn test_inputs_reach_one_worker_per_agent() {
        let client = MockLlmClient::from_steps(
            "gpt-4",
            vec![MockStep::text(r#"{"iWantToSay": "hello"}"#)],
        );
        let container = container(&client);
        container
            .add_pending_input(step_input("default", "sim-1", 1.0))
            .unwrap();

        let outputs = wait_for_outputs(&container, "sim-1").await;
        let finished = outputs
            .iter()
            .find(|o| o.agent_status == Some(AgentStatus::PromptFinished))
            .unwrap();
        assert_eq!(finished.actions.len(), 1);
        assert_eq!(container.agent_count(), 1);
        assert!(
            container
                .consume_pending_outputs("sim-1", "agent-1", "scripted")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_step_errors_are_reported_by_id() {
        let client = MockLlmClient::new("gpt-4");
        let container = container(&client);
        let mut input = step_input("default", "sim-1", 1.0);
        input.self_info.core_personality = "word ".repeat(40_000);
        container.add_pending_input(input).unwrap();

        let outputs = wait_for_outputs(&container, "sim-1").await;
        let error = outputs.iter().find_map(|o| o.error.as_deref()).unwrap();
        assert!(error.starts_with("Error on agent server (errorId = "));
    }

    #[tokio::test]
    async fn test_terminate_only_stops_that_simulation() {
        let client = MockLlmClient::new("gpt-4");
        let container = container(&client);
        container
            .add_pending_input(step_input("default", "sim-1", 1.0))
            .unwrap();
        container
            .add_pending_input(step_input("default", "sim-2", 1.0))
            .unwrap();
        assert_eq!(container.agent_count(), 2);

        assert_eq!(container.terminate_simulation("sim-1").await, 1);
        assert_eq!(container.agent_count(), 1);
        assert_eq!(container.terminate_simulation("sim-1").await, 0);
        assert_eq!(container.terminate_simulation("sim-2").await, 1);
    }
}
